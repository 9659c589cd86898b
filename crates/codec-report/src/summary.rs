use crate::TrialResult;
use serde::{Deserialize, Serialize};
use std::fmt;

pub fn failure_count(trials: &[TrialResult]) -> usize {
    trials.iter().filter(|t| !t.succeeded).count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "failures", rename_all = "snake_case")]
pub enum OverallStatus {
    AllSucceeded,
    Failed(usize),
}

impl OverallStatus {
    pub fn from_failure_count(failures: usize) -> Self {
        if failures == 0 {
            OverallStatus::AllSucceeded
        } else {
            OverallStatus::Failed(failures)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OverallStatus::AllSucceeded)
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::AllSucceeded => write!(f, "All tests appear to have succeeded."),
            OverallStatus::Failed(n) => {
                write!(f, "There were {} failing tests. See above for details.", n)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub description: String,
    pub original_size: Option<u64>,
    pub original_size_text: String,
    pub compressed_size: Option<u64>,
    pub compressed_size_text: String,
    pub ratio_percent: Option<f64>,
    pub ratio_text: String,
    pub entropy: f64,
    pub entropy_text: String,
    pub ok: bool,
    pub status_label: String,
    pub compression_seconds: f64,
    pub compression_text: String,
    pub decompression_seconds: f64,
    pub decompression_text: String,
}

impl ReportRow {
    pub fn from_trial(trial: &TrialResult) -> Self {
        Self {
            description: trial.description.clone(),
            original_size: trial.original_size_bytes,
            original_size_text: size_text(trial.original_size_bytes),
            compressed_size: trial.compressed_size_bytes,
            compressed_size_text: size_text(trial.compressed_size_bytes),
            ratio_percent: trial.ratio_percent,
            ratio_text: trial
                .ratio_percent
                .map(|r| format!("{:.2}", r))
                .unwrap_or_else(|| "-".to_string()),
            entropy: trial.entropy_bits_per_symbol,
            entropy_text: format!("{:.2}", trial.entropy_bits_per_symbol),
            ok: trial.succeeded,
            status_label: if trial.succeeded { "OK" } else { "FAIL" }.to_string(),
            compression_seconds: trial.compression_duration_seconds,
            compression_text: format!("{:.3}", trial.compression_duration_seconds),
            decompression_seconds: trial.decompression_duration_seconds,
            decompression_text: format!("{:.3}", trial.decompression_duration_seconds),
        }
    }
}

fn size_text(size: Option<u64>) -> String {
    size.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{passing, trial};
    use crate::TrialError;

    #[test]
    fn failure_count_counts_unsucceeded_trials() {
        let mut failed = trial(1, "a", true, false);
        failed.fail(TrialError::ContentMismatch);
        let trials = vec![passing(0, "a"), failed, trial(2, "a", true, true)];
        assert_eq!(failure_count(&trials), 2);
        assert_eq!(failure_count(&[]), 0);
    }

    #[test]
    fn row_formats_fixed_precision() {
        let row = ReportRow::from_trial(&passing(0, "cb.raw"));
        assert_eq!(row.description, "cb.raw (static)");
        assert_eq!(row.original_size_text, "1000");
        assert_eq!(row.compressed_size_text, "250");
        assert_eq!(row.ratio_percent, Some(25.0));
        assert_eq!(row.ratio_text, "25.00");
        assert_eq!(row.entropy_text, "3.25");
        assert_eq!(row.status_label, "OK");
        assert_eq!(row.compression_text, "0.012");
        assert_eq!(row.decompression_text, "0.005");
    }

    #[test]
    fn row_uses_placeholders_for_absent_values() {
        let mut t = trial(0, "empty.raw", false, false);
        t.original_size_bytes = Some(0);
        t.fail(TrialError::ContentMismatch);
        let row = ReportRow::from_trial(&t);
        assert_eq!(row.original_size_text, "0");
        assert_eq!(row.compressed_size_text, "-");
        assert_eq!(row.ratio_text, "-");
        assert_eq!(row.status_label, "FAIL");
        assert!(!row.ok);
    }

    #[test]
    fn overall_status_messages() {
        assert_eq!(
            OverallStatus::from_failure_count(0).to_string(),
            "All tests appear to have succeeded."
        );
        let failed = OverallStatus::from_failure_count(3);
        assert_eq!(failed, OverallStatus::Failed(3));
        assert!(!failed.is_success());
        assert_eq!(
            failed.to_string(),
            "There were 3 failing tests. See above for details."
        );
    }
}
