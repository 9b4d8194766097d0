//! JAGS command-line engine.
//!
//! Each fit runs in its own scratch directory: the model, data and per-chain
//! initial values are written as files, a command script drives the JAGS
//! binary, and the CODA output is read back. The process is killed when it
//! exceeds its time budget.

use super::{ChainInits, EstimationEngine, ModelSpec, NamedDraws};
use crate::models::{EngineConfig, EngineError, SummaryData};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const CODA_STEM: &str = "CODA";
const OUTPUT_FILE: &str = "jags.out";

/// Engine output markers that mean the fit failed even on a zero exit status.
const RUNTIME_MARKERS: [&str; 2] = ["RUNTIME ERROR", "Error in node"];
const COMPILE_MARKERS: [&str; 3] = ["Compilation error", "syntax error", "parse error"];

/// Runs the JAGS binary as a child process.
#[derive(Debug, Clone)]
pub struct JagsEngine {
    binary: String,
    adapt: u32,
    burnin: u32,
    samples: u32,
    chains: u32,
    timeout: Option<Duration>,
    keep_workdir: bool,
}

impl JagsEngine {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            binary: config.resolved_binary(),
            adapt: config.adapt,
            burnin: config.burnin,
            samples: config.samples,
            chains: config.chains,
            timeout: config.timeout(),
            keep_workdir: config.keep_workdir,
        }
    }

    /// The command script driving one fit.
    fn script(&self) -> String {
        let mut script = String::new();
        let _ = writeln!(script, "model in \"model.bug\"");
        let _ = writeln!(script, "data in \"data.R\"");
        let _ = writeln!(script, "compile, nchains({})", self.chains);
        for chain in 1..=self.chains {
            let _ = writeln!(script, "parameters in \"inits{chain}.R\", chain({chain})");
        }
        let _ = writeln!(script, "initialize");
        if self.adapt > 0 {
            let _ = writeln!(script, "adapt {}", self.adapt);
        }
        if self.burnin > 0 {
            let _ = writeln!(script, "update {}", self.burnin);
        }
        for node in ModelSpec::monitors() {
            let _ = writeln!(script, "monitor {node}");
        }
        let _ = writeln!(script, "update {}", self.samples);
        let _ = writeln!(script, "coda *, stem(\"{CODA_STEM}\")");
        let _ = writeln!(script, "exit");
        script
    }

    fn write_workspace(
        &self,
        dir: &Path,
        model: &ModelSpec,
        data: &SummaryData,
        inits: &[ChainInits],
    ) -> Result<(), EngineError> {
        write_file(dir, "model.bug", &model.text())?;
        write_file(dir, "data.R", &r_dump_data(data))?;
        for (chain, init) in inits.iter().enumerate() {
            write_file(dir, &format!("inits{}.R", chain + 1), &r_dump_inits(init))?;
        }
        write_file(dir, "script.cmd", &self.script())
    }

    /// Run the binary to completion or until the time budget runs out.
    /// Returns the combined stdout/stderr text.
    fn run(&self, dir: &Path) -> Result<String, EngineError> {
        let output_path = dir.join(OUTPUT_FILE);
        let stdout = File::create(&output_path).map_err(workspace("creating engine log"))?;
        let stderr = stdout.try_clone().map_err(workspace("cloning engine log"))?;

        let mut child = Command::new(&self.binary)
            .arg("script.cmd")
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|source| EngineError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait().map_err(workspace("polling engine"))? {
                break status;
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(EngineError::Timeout(limit));
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let output = fs::read_to_string(&output_path).unwrap_or_default();
        trace!(elapsed_ms = started.elapsed().as_millis() as u64, "Engine exited");
        classify_output(status.success(), &output)?;
        Ok(output)
    }

    fn read_draws(&self, dir: &Path) -> Result<NamedDraws, EngineError> {
        let index = read_output(dir, &format!("{CODA_STEM}index.txt"))?;
        let chains = (1..=self.chains)
            .map(|k| read_output(dir, &format!("{CODA_STEM}chain{k}.txt")))
            .collect::<Result<Vec<_>, _>>()?;
        parse_coda(&index, &chains)
    }
}

impl EstimationEngine for JagsEngine {
    fn name(&self) -> &str {
        "jags"
    }

    fn chains(&self) -> u32 {
        self.chains
    }

    fn fit(
        &self,
        model: &ModelSpec,
        data: &SummaryData,
        inits: &[ChainInits],
    ) -> Result<NamedDraws, EngineError> {
        let workdir = tempfile::Builder::new()
            .prefix("ezbhddm-jags-")
            .tempdir()
            .map_err(workspace("creating scratch directory"))?;

        self.write_workspace(workdir.path(), model, data, inits)?;
        let result = self.run(workdir.path()).and_then(|_| self.read_draws(workdir.path()));

        if self.keep_workdir {
            let kept = workdir.keep();
            debug!(path = %kept.display(), "Kept engine workspace");
        }
        result
    }
}

fn workspace(context: &'static str) -> impl Fn(std::io::Error) -> EngineError {
    move |source| EngineError::Workspace {
        context: context.to_string(),
        source,
    }
}

fn write_file(dir: &Path, name: &str, contents: &str) -> Result<(), EngineError> {
    fs::write(dir.join(name), contents).map_err(|source| EngineError::Workspace {
        context: format!("writing {name}"),
        source,
    })
}

fn read_output(dir: &Path, name: &str) -> Result<String, EngineError> {
    fs::read_to_string(dir.join(name)).map_err(|e| EngineError::MissingOutput(format!("{name}: {e}")))
}

/// Map engine output to a failure, if it reports one.
fn classify_output(success: bool, output: &str) -> Result<(), EngineError> {
    if COMPILE_MARKERS.iter().any(|m| output.contains(m)) {
        return Err(EngineError::Compile {
            message: output.trim().to_string(),
        });
    }
    if !success || RUNTIME_MARKERS.iter().any(|m| output.contains(m)) {
        return Err(EngineError::Runtime {
            message: output.trim().to_string(),
        });
    }
    Ok(())
}

fn r_vector<T: std::fmt::Debug>(values: &[T]) -> String {
    let items: Vec<String> = values.iter().map(|v| format!("{v:?}")).collect();
    format!("c({})", items.join(", "))
}

/// Summary data in R dump format.
pub fn r_dump_data(data: &SummaryData) -> String {
    format!(
        "\"nTrials\" <- {}\n\"meanRT\" <- {}\n\"varRT\" <- {}\n\"correct\" <- {}\n\"X\" <- {}\n",
        r_vector(&data.n_trials),
        r_vector(&data.mean_rt),
        r_vector(&data.var_rt),
        r_vector(&data.correct),
        r_vector(&data.x),
    )
}

/// One chain's initial values in R dump format.
pub fn r_dump_inits(inits: &ChainInits) -> String {
    format!(
        "\"drift\" <- {}\n\".RNG.name\" <- \"base::Mersenne-Twister\"\n\".RNG.seed\" <- {}\n",
        r_vector(&inits.drift),
        inits.rng_seed
    )
}

/// Parse CODA index and chain files into draws pooled over chains.
///
/// Index lines are `name first last`, 1-based line numbers into every chain
/// file; chain lines are `iteration value`.
pub fn parse_coda(index: &str, chains: &[String]) -> Result<NamedDraws, EngineError> {
    let chain_values = chains
        .iter()
        .map(|text| {
            text.lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| {
                    line.split_whitespace()
                        .nth(1)
                        .and_then(|v| v.parse::<f64>().ok())
                        .ok_or_else(|| {
                            EngineError::MalformedOutput(format!("bad chain line '{line}'"))
                        })
                })
                .collect::<Result<Vec<f64>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut draws = NamedDraws::new();
    for line in index.lines().filter(|line| !line.trim().is_empty()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [name, first, last] = fields.as_slice() else {
            return Err(EngineError::MalformedOutput(format!("bad index line '{line}'")));
        };
        let (Ok(first), Ok(last)) = (first.parse::<usize>(), last.parse::<usize>()) else {
            return Err(EngineError::MalformedOutput(format!("bad index line '{line}'")));
        };
        if first == 0 || last < first {
            return Err(EngineError::MalformedOutput(format!("bad index range '{line}'")));
        }

        let pooled = draws.entry(name.to_string()).or_insert_with(Vec::new);
        for values in &chain_values {
            let slice = values.get(first - 1..last).ok_or_else(|| {
                EngineError::MalformedOutput(format!("index range of {name} exceeds chain length"))
            })?;
            pooled.extend_from_slice(slice);
        }
    }

    if draws.is_empty() {
        return Err(EngineError::MissingOutput("CODA index is empty".to_string()));
    }
    Ok(draws)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Prior, TargetParameter};

    fn engine(binary: &str, chains: u32, timeout: Option<Duration>) -> JagsEngine {
        JagsEngine {
            binary: binary.to_string(),
            adapt: 100,
            burnin: 0,
            samples: 2,
            chains,
            timeout,
            keep_workdir: false,
        }
    }

    fn one_participant() -> SummaryData {
        SummaryData {
            participants: vec![0],
            total_participants: 1,
            n_trials: vec![40],
            mean_rt: vec![0.55],
            var_rt: vec![0.04],
            correct: vec![31],
            x: vec![0.0],
        }
    }

    #[test]
    fn test_r_dump_format() {
        let text = r_dump_data(&one_participant());
        assert!(text.contains("\"nTrials\" <- c(40)\n"));
        assert!(text.contains("\"meanRT\" <- c(0.55)\n"));
        assert!(text.contains("\"X\" <- c(0.0)\n"));

        let inits = r_dump_inits(&ChainInits {
            drift: vec![0.1, -0.2],
            rng_seed: 7,
        });
        assert!(inits.starts_with("\"drift\" <- c(0.1, -0.2)\n"));
        assert!(inits.contains("\".RNG.seed\" <- 7"));
    }

    #[test]
    fn test_script_lists_chains_and_monitors() {
        let script = engine("jags", 3, None).script();
        assert!(script.contains("compile, nchains(3)"));
        assert!(script.contains("parameters in \"inits3.R\", chain(3)"));
        assert!(script.contains("monitor betaweight"));
        assert!(script.contains("monitor nondt\n"));
        assert!(script.contains("adapt 100"));
        assert!(!script.contains("update 0"));
        assert!(script.trim_end().ends_with("exit"));
    }

    #[test]
    fn test_parse_coda_pools_chains() {
        let index = "betaweight 1 2\nbound[1] 3 4\n";
        let chains = vec![
            "1 0.1\n2 0.2\n1 1.5\n2 1.6\n".to_string(),
            "1 0.3\n2 0.4\n1 1.7\n2 1.8\n".to_string(),
        ];
        let draws = parse_coda(index, &chains).unwrap();
        assert_eq!(draws["betaweight"], vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(draws["bound[1]"], vec![1.5, 1.6, 1.7, 1.8]);
    }

    #[test]
    fn test_parse_coda_rejects_bad_range() {
        let chains = vec!["1 0.1\n".to_string()];
        assert!(matches!(
            parse_coda("betaweight 1 5\n", &chains),
            Err(EngineError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_coda("betaweight one\n", &chains),
            Err(EngineError::MalformedOutput(_))
        ));
        assert!(matches!(parse_coda("", &chains), Err(EngineError::MissingOutput(_))));
    }

    #[test]
    fn test_classify_output() {
        assert!(classify_output(true, "Reading data file data.R\n").is_ok());
        assert!(matches!(
            classify_output(true, "RUNTIME ERROR:\nInvalid parent values"),
            Err(EngineError::Runtime { .. })
        ));
        assert!(matches!(
            classify_output(true, "Compilation error on line 5."),
            Err(EngineError::Compile { .. })
        ));
        assert!(matches!(classify_output(false, ""), Err(EngineError::Runtime { .. })));
    }

    #[test]
    fn test_missing_binary_is_a_spawn_error() {
        let model = ModelSpec::new(&Prior::default(), TargetParameter::Drift);
        let inits = vec![ChainInits {
            drift: vec![0.0],
            rng_seed: 1,
        }];
        let err = engine("/nonexistent/ezbhddm-jags", 1, None)
            .fit(&model, &one_participant(), &inits)
            .unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[cfg(unix)]
    fn fake_binary(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-jags");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_engine() {
        let bin_dir = tempfile::TempDir::new().unwrap();
        let binary = fake_binary(bin_dir.path(), "exec sleep 10");
        let model = ModelSpec::new(&Prior::default(), TargetParameter::Drift);
        let inits = vec![ChainInits {
            drift: vec![0.0],
            rng_seed: 1,
        }];

        let started = Instant::now();
        let err = engine(&binary, 1, Some(Duration::from_millis(200)))
            .fit(&model, &one_participant(), &inits)
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
        assert!(err.is_retryable());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_fit_reads_coda_output() {
        let mut index = String::new();
        let mut chain = String::new();
        for (i, node) in ModelSpec::monitors().iter().enumerate() {
            let node = match *node {
                "bound" | "drift" | "nondt" => format!("{node}[1]"),
                other => other.to_string(),
            };
            index.push_str(&format!("{node} {} {}\n", 2 * i + 1, 2 * i + 2));
            chain.push_str(&format!("1 {}\n2 {}\n", i, i + 1));
        }
        let body = format!(
            "test -f model.bug && test -f data.R && test -f inits1.R || exit 3\n\
             cat > CODAindex.txt <<'EOF'\n{index}EOF\n\
             cat > CODAchain1.txt <<'EOF'\n{chain}EOF\n\
             echo 'Reading data file data.R'"
        );
        let bin_dir = tempfile::TempDir::new().unwrap();
        let binary = fake_binary(bin_dir.path(), &body);

        let model = ModelSpec::new(&Prior::default(), TargetParameter::Drift);
        let inits = vec![ChainInits {
            drift: vec![0.0],
            rng_seed: 1,
        }];
        let draws = engine(&binary, 1, Some(Duration::from_secs(10)))
            .fit(&model, &one_participant(), &inits)
            .unwrap();

        assert_eq!(draws.len(), 10);
        assert_eq!(draws["betaweight"], vec![0.0, 1.0]);
        assert_eq!(draws["drift[1]"].len(), 2);
    }
}
