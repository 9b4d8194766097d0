//! Synthetic trial data and its per-participant sufficient statistics.

use super::{GeneratorError, ParameterSet, Result, SimError};
use crate::diffusion::ResponseTimeGenerator;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generator calls per participant before a batch with no correct
/// responses is treated as degenerate.
pub const MAX_RESAMPLE_ATTEMPTS: usize = 1000;

/// Raw trial-level observations, concatenated across participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialDataset {
    pub participant: Vec<usize>,
    pub response_time: Vec<f64>,
    pub correct: Vec<bool>,
    pub trials_per_participant: usize,
    pub covariate: Vec<f64>,
}

impl TrialDataset {
    /// Simulate `trials` trials for every participant of `truth`.
    ///
    /// A participant's batch is redrawn until it contains at least one
    /// correct response, at most [`MAX_RESAMPLE_ATTEMPTS`] times.
    pub fn sample<G: ResponseTimeGenerator + ?Sized>(
        truth: &ParameterSet,
        trials: usize,
        covariate: &[f64],
        generator: &G,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        let participants = truth.participants();
        if participants != covariate.len() {
            return Err(SimError::Precondition(format!(
                "parameter set covers {participants} participants but the covariate has {}",
                covariate.len()
            )));
        }

        let total = participants * trials;
        let mut dataset = Self {
            participant: Vec::with_capacity(total),
            response_time: Vec::with_capacity(total),
            correct: Vec::with_capacity(total),
            trials_per_participant: trials,
            covariate: covariate.to_vec(),
        };

        for p in 0..participants {
            let (bound, drift, nondt) = truth.participant(p).ok_or_else(|| {
                SimError::Precondition(format!("ground truth is missing participant {p}"))
            })?;

            let mut attempts = 0;
            let batch = loop {
                if attempts == MAX_RESAMPLE_ATTEMPTS {
                    return Err(GeneratorError::NoCorrectResponses { attempts }.into());
                }
                attempts += 1;
                let batch = generator.simulate(bound, drift, nondt, trials, rng)?;
                if batch.correct_count() > 0 {
                    break batch;
                }
            };
            if attempts > 1 {
                tracing::trace!(participant = p, attempts, "Resampled all-incorrect batch");
            }

            dataset.participant.extend(std::iter::repeat(p).take(batch.len()));
            dataset.response_time.extend(batch.response_time);
            dataset.correct.extend(batch.correct);
        }

        Ok(dataset)
    }

    /// Number of participants the dataset was generated for.
    pub fn participants(&self) -> usize {
        self.covariate.len()
    }

    /// Per-participant summaries over correct responses.
    ///
    /// Variance uses the population (divide-by-n) convention.
    pub fn summarize(&self) -> DataSummary {
        let mut rows: Vec<ParticipantSummary> = self
            .covariate
            .iter()
            .enumerate()
            .map(|(participant, &covariate)| ParticipantSummary {
                participant,
                trial_count: 0,
                correct_count: 0,
                mean_rt: None,
                var_rt: None,
                covariate,
            })
            .collect();

        let mut correct_rts: Vec<Vec<f64>> = vec![Vec::new(); rows.len()];
        for ((&p, &rt), &correct) in self
            .participant
            .iter()
            .zip(&self.response_time)
            .zip(&self.correct)
        {
            let Some(row) = rows.get_mut(p) else { continue };
            row.trial_count += 1;
            if correct {
                row.correct_count += 1;
                correct_rts[p].push(rt);
            }
        }

        for (row, rts) in rows.iter_mut().zip(&correct_rts) {
            if rts.len() >= 2 {
                let n = rts.len() as f64;
                let mean = rts.iter().sum::<f64>() / n;
                let var = rts.iter().map(|rt| (rt - mean).powi(2)).sum::<f64>() / n;
                row.mean_rt = Some(mean);
                row.var_rt = Some(var);
            }
        }

        DataSummary { rows }
    }
}

/// Sufficient statistics of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSummary {
    pub participant: usize,
    pub trial_count: usize,
    pub correct_count: usize,
    /// Mean correct RT; `None` with fewer than two correct trials
    pub mean_rt: Option<f64>,
    /// Variance of correct RTs; `None` with fewer than two correct trials
    pub var_rt: Option<f64>,
    pub covariate: f64,
}

impl ParticipantSummary {
    pub fn accuracy(&self) -> f64 {
        if self.trial_count == 0 {
            return f64::NAN;
        }
        self.correct_count as f64 / self.trial_count as f64
    }

    /// Whether this participant can be passed to an estimator.
    pub fn is_retained(&self) -> bool {
        self.mean_rt.is_some() && self.var_rt.is_some()
    }
}

/// Summaries for every participant, retained or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSummary {
    pub rows: Vec<ParticipantSummary>,
}

impl DataSummary {
    pub fn participants(&self) -> usize {
        self.rows.len()
    }

    /// Participants with at least two correct trials.
    pub fn retained(&self) -> impl Iterator<Item = &ParticipantSummary> {
        self.rows.iter().filter(|r| r.is_retained())
    }

    /// Columnar data for the estimation engine, retained participants only.
    pub fn engine_data(&self) -> SummaryData {
        let mut data = SummaryData {
            total_participants: self.rows.len(),
            ..SummaryData::default()
        };
        for row in self.retained() {
            let (Some(mean), Some(var)) = (row.mean_rt, row.var_rt) else {
                continue;
            };
            data.participants.push(row.participant);
            data.n_trials.push(row.trial_count);
            data.mean_rt.push(mean);
            data.var_rt.push(var);
            data.correct.push(row.correct_count);
            data.x.push(row.covariate);
        }
        data
    }
}

impl fmt::Display for DataSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<10} {:<20} {:<20} {:<20}",
            "Person", "Mean Accuracy", "Mean RT (Correct)", "Variance RT (Correct)"
        )?;
        let cell = |v: Option<f64>| v.map_or_else(|| "NA".to_string(), |v| format!("{v:.3}"));
        for row in &self.rows {
            writeln!(
                f,
                "{:<10} {:<20.3} {:<20} {:<20}",
                row.participant,
                row.accuracy(),
                cell(row.mean_rt),
                cell(row.var_rt)
            )?;
        }
        Ok(())
    }
}

/// The estimation engine's data block: `{nTrials, meanRT, varRT, correct, X}`.
///
/// `participants[i]` maps row `i` back to the participant index in the
/// simulated experiment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryData {
    pub participants: Vec<usize>,
    pub total_participants: usize,
    pub n_trials: Vec<usize>,
    pub mean_rt: Vec<f64>,
    pub var_rt: Vec<f64>,
    pub correct: Vec<usize>,
    pub x: Vec<f64>,
}

impl SummaryData {
    /// Number of retained participants.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::{Trials, WienerGenerator};
    use crate::models::{Prior, TargetParameter};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns all-incorrect batches for the first `failures` calls.
    struct Stubborn {
        failures: usize,
        calls: AtomicUsize,
    }

    impl ResponseTimeGenerator for Stubborn {
        fn simulate(
            &self,
            _bound: f64,
            _drift: f64,
            nondt: f64,
            n: usize,
            _rng: &mut dyn RngCore,
        ) -> std::result::Result<Trials, GeneratorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Trials {
                response_time: vec![nondt + 0.5; n],
                correct: vec![call >= self.failures; n],
            })
        }
    }

    fn truth(participants: usize) -> ParameterSet {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let covariate = vec![0.0; participants];
        ParameterSet::sample(&Prior::default(), TargetParameter::Drift, &covariate, &mut rng)
            .unwrap()
    }

    #[test]
    fn test_all_incorrect_batches_are_redrawn() {
        let generator = Stubborn {
            failures: 3,
            calls: AtomicUsize::new(0),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let dataset =
            TrialDataset::sample(&truth(2), 4, &[0.0, 1.0], &generator, &mut rng).unwrap();

        assert_eq!(dataset.response_time.len(), 8);
        assert_eq!(dataset.participant, vec![0, 0, 0, 0, 1, 1, 1, 1]);
        assert!(dataset.correct.iter().all(|&c| c));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_resampling_is_capped() {
        let generator = Stubborn {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = TrialDataset::sample(&truth(1), 4, &[0.0], &generator, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            SimError::Generator(GeneratorError::NoCorrectResponses { .. })
        ));
        assert_eq!(generator.calls.load(Ordering::SeqCst), MAX_RESAMPLE_ATTEMPTS);
    }

    #[test]
    fn test_every_participant_has_a_correct_response() {
        let generator = WienerGenerator::new();
        let mut rng = ChaCha8Rng::seed_from_u64(23);
        let covariate = vec![0.0; 30];
        for _ in 0..20 {
            let truth = ParameterSet::sample(
                &Prior::default(),
                TargetParameter::Drift,
                &covariate,
                &mut rng,
            )
            .unwrap();
            let Ok(dataset) = TrialDataset::sample(&truth, 3, &covariate, &generator, &mut rng)
            else {
                // an untruncated bound draw can be non-positive
                continue;
            };
            let summary = dataset.summarize();
            assert!(summary.rows.iter().all(|r| r.correct_count >= 1));
            assert!(summary.rows.iter().all(|r| r.correct_count <= r.trial_count));
        }
    }

    #[test]
    fn test_mismatched_covariate_is_a_precondition_error() {
        let generator = WienerGenerator::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = TrialDataset::sample(&truth(3), 5, &[0.0, 1.0], &generator, &mut rng)
            .unwrap_err();
        assert!(matches!(err, SimError::Precondition(_)));
    }

    #[test]
    fn test_summary_filters_and_uses_population_variance() {
        let dataset = TrialDataset {
            participant: vec![0, 0, 0, 0, 1, 1, 1, 1],
            response_time: vec![0.4, 0.6, 0.9, 2.0, 0.5, 0.7, 0.8, 0.9],
            correct: vec![true, true, false, true, true, false, false, false],
            trials_per_participant: 4,
            covariate: vec![0.0, 1.0],
        };
        let summary = dataset.summarize();

        let first = &summary.rows[0];
        assert_eq!(first.correct_count, 3);
        assert_eq!(first.trial_count, 4);
        let mean = (0.4 + 0.6 + 2.0) / 3.0;
        assert!((first.mean_rt.unwrap() - mean).abs() < 1e-12);
        let var = ((0.4f64 - mean).powi(2) + (0.6f64 - mean).powi(2) + (2.0f64 - mean).powi(2)) / 3.0;
        assert!((first.var_rt.unwrap() - var).abs() < 1e-12);

        // one correct trial is not enough for a variance
        assert!(!summary.rows[1].is_retained());

        let data = summary.engine_data();
        assert_eq!(data.len(), 1);
        assert_eq!(data.participants, vec![0]);
        assert_eq!(data.total_participants, 2);
        assert_eq!(data.correct, vec![3]);
        assert_eq!(data.n_trials, vec![4]);
        assert_eq!(data.x, vec![0.0]);
    }

    #[test]
    fn test_summary_table_marks_missing() {
        let dataset = TrialDataset {
            participant: vec![0, 0],
            response_time: vec![0.4, 0.6],
            correct: vec![true, false],
            trials_per_participant: 2,
            covariate: vec![0.0],
        };
        let table = dataset.summarize().to_string();
        assert!(table.starts_with("Person"));
        assert!(table.contains("NA"));
    }
}
