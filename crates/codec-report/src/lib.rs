use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub mod render;
pub mod summary;

pub use render::{read_report, render_latex, render_text, to_json_value};
pub use summary::{failure_count, OverallStatus, ReportRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    pub uses_adaptive_model: bool,
    pub uses_preprocessing: bool,
    pub width: u32,
}

impl Configuration {
    pub fn suffix(&self) -> &'static str {
        match (self.uses_adaptive_model, self.uses_preprocessing) {
            (false, false) => "_static",
            (false, true) => "_static_m",
            (true, false) => "_adaptive",
            (true, true) => "_adaptive_m",
        }
    }

    pub fn label(&self) -> &'static str {
        match (self.uses_adaptive_model, self.uses_preprocessing) {
            (false, false) => "static",
            (false, true) => "static + preprocess",
            (true, false) => "adaptive",
            (true, true) => "adaptive + preprocess",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStage {
    Compression,
    Decompression,
}

impl fmt::Display for TrialStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrialStage::Compression => write!(f, "compression"),
            TrialStage::Decompression => write!(f, "decompression"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrialError {
    #[error("Compression failed. Stderr:\n{stderr}")]
    CompressionFailure { exit_code: i32, stderr: String },

    #[error("Compressed file {} does not exist.", .path.display())]
    MissingCompressedOutput { path: PathBuf },

    #[error("Decompression failed. Stderr:\n{stderr}")]
    DecompressionFailure { exit_code: i32, stderr: String },

    #[error("Decompressed file {} not found.", .path.display())]
    MissingDecompressedOutput { path: PathBuf },

    #[error("Files differ.")]
    ContentMismatch,

    #[error("Command not found during {stage}: {program}")]
    CommandNotFound { stage: TrialStage, program: String },

    #[error("Trial cancelled during {stage}.")]
    Cancelled { stage: TrialStage },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub index: usize,
    pub file_id: String,
    pub configuration: Configuration,
    pub description: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub decompressed_path: PathBuf,
    pub original_size_bytes: Option<u64>,
    pub compressed_size_bytes: Option<u64>,
    pub ratio_percent: Option<f64>,
    pub entropy_bits_per_symbol: f64,
    pub succeeded: bool,
    pub error: Option<TrialError>,
    pub error_message: Option<String>,
    pub compression_duration_seconds: f64,
    pub decompression_duration_seconds: f64,
}

impl TrialResult {
    pub fn new(
        index: usize,
        file_id: &str,
        configuration: Configuration,
        input_path: PathBuf,
        output_path: PathBuf,
        decompressed_path: PathBuf,
        entropy_bits_per_symbol: f64,
    ) -> Self {
        Self {
            index,
            file_id: file_id.to_string(),
            configuration,
            description: format!("{} ({})", file_id, configuration.label()),
            input_path,
            output_path,
            decompressed_path,
            original_size_bytes: None,
            compressed_size_bytes: None,
            ratio_percent: None,
            entropy_bits_per_symbol,
            succeeded: false,
            error: None,
            error_message: None,
            compression_duration_seconds: 0.0,
            decompression_duration_seconds: 0.0,
        }
    }

    pub fn fail(&mut self, error: TrialError) {
        self.succeeded = false;
        self.error_message = Some(error.to_string());
        self.error = Some(error);
    }

    pub fn succeed(&mut self) {
        self.succeeded = true;
        self.error = None;
        self.error_message = None;
    }
}

pub fn compression_ratio(original_size: u64, compressed_size: u64) -> Option<f64> {
    if original_size == 0 {
        return None;
    }
    Some(compressed_size as f64 / original_size as f64 * 100.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub schema_version: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub config_digest: Option<String>,
    pub total_planned: usize,
    pub cancelled: bool,
    pub failure_count: usize,
    pub trials: Vec<TrialResult>,
}

impl BenchmarkReport {
    pub fn from_trials(
        run_id: &str,
        mut trials: Vec<TrialResult>,
        total_planned: usize,
        cancelled: bool,
    ) -> Self {
        trials.sort_by_key(|t| t.index);
        Self {
            schema_version: "benchmark_report_v1".to_string(),
            run_id: run_id.to_string(),
            created_at: Utc::now(),
            config_digest: None,
            total_planned,
            cancelled,
            failure_count: failure_count(&trials),
            trials,
        }
    }

    pub fn with_config_digest(mut self, digest: String) -> Self {
        self.config_digest = Some(digest);
        self
    }

    pub fn rows(&self) -> Vec<ReportRow> {
        self.trials.iter().map(ReportRow::from_trial).collect()
    }

    pub fn overall_status(&self) -> OverallStatus {
        OverallStatus::from_failure_count(self.failure_count)
    }

    pub fn skipped_count(&self) -> usize {
        self.total_planned.saturating_sub(self.trials.len())
    }
}
