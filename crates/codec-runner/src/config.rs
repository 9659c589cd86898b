use crate::matrix::{base_name, is_artifact_name};
use anyhow::{anyhow, Result};
use codec_core::canonical_json_digest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

pub const DEFAULT_WIDTH: u32 = 512;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default = "default_version")]
    pub version: String,
    pub codec: CodecConfig,
    #[serde(default)]
    pub build: Option<BuildConfig>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub discover: bool,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    pub command: Vec<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default)]
    pub decompress_with_mode_flags: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub command: Vec<String>,
    #[serde(default)]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub decompressed_dir: PathBuf,
    pub report_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("tests/in/kko.proj.data"),
            output_dir: PathBuf::from("tests/out"),
            decompressed_dir: PathBuf::from("tests/in/kko.proj.data"),
            report_dir: PathBuf::from(".bench/runs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default)]
    pub timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub measure_times: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            timeout_seconds: 0,
            measure_times: true,
        }
    }
}

fn default_version() -> String {
    "0.1".to_string()
}

fn default_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_jobs() -> usize {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    pub file_id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    pub codec_command: Vec<String>,
    pub width: u32,
    pub decompress_with_mode_flags: bool,
    pub build_command: Option<Vec<String>>,
    pub build_timeout: Option<Duration>,
    pub base_dir: PathBuf,
    pub inputs: Vec<InputFile>,
    pub output_dir: PathBuf,
    pub decompressed_dir: PathBuf,
    pub report_dir: PathBuf,
    pub jobs: usize,
    pub timeout: Option<Duration>,
    pub measure_times: bool,
}

impl RunSettings {
    pub fn new(
        codec_command: Vec<String>,
        inputs: Vec<InputFile>,
        output_dir: PathBuf,
        decompressed_dir: PathBuf,
    ) -> Self {
        let base_dir = PathBuf::from(".");
        Self {
            codec_command,
            width: DEFAULT_WIDTH,
            decompress_with_mode_flags: false,
            build_command: None,
            build_timeout: None,
            report_dir: output_dir.join("runs"),
            base_dir,
            inputs,
            output_dir,
            decompressed_dir,
            jobs: 1,
            timeout: None,
            measure_times: true,
        }
    }

    pub fn apply_overrides(&mut self, overrides: &RunOverrides) -> Result<()> {
        if let Some(jobs) = overrides.jobs {
            if jobs == 0 {
                return Err(anyhow!("jobs must be at least 1"));
            }
            self.jobs = jobs;
        }
        if let Some(secs) = overrides.timeout_seconds {
            self.timeout = timeout_from_secs(secs);
        }
        if let Some(width) = overrides.width {
            if width == 0 {
                return Err(anyhow!("width must be greater than 0"));
            }
            self.width = width;
        }
        Ok(())
    }

    pub fn total_trials(&self) -> usize {
        self.inputs.len() * 4
    }

    pub fn digest(&self) -> String {
        serde_json::to_value(self)
            .map(|v| canonical_json_digest(&v))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub jobs: Option<usize>,
    pub timeout_seconds: Option<u64>,
    pub width: Option<u32>,
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

pub fn load_config(path: &Path) -> Result<RunSettings> {
    let raw = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config {}: {}", path.display(), e))?;
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(&raw)?;
    let json_value: Value = serde_json::to_value(yaml_value)?;
    validate_required_fields(&json_value)?;
    let config: BenchConfig = serde_json::from_value(json_value)?;
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    resolve_settings(&config, &base_dir)
}

pub fn resolve_settings(config: &BenchConfig, base_dir: &Path) -> Result<RunSettings> {
    let input_dir = base_dir.join(&config.paths.input_dir);
    let output_dir = base_dir.join(&config.paths.output_dir);
    let decompressed_dir = base_dir.join(&config.paths.decompressed_dir);
    let inputs = if config.discover {
        let mut found = discover_inputs(&input_dir)?;
        if same_dir(&input_dir, &output_dir) || same_dir(&input_dir, &decompressed_dir) {
            found.retain(|input| !is_artifact_name(&input.file_id));
        }
        found
    } else {
        config
            .files
            .iter()
            .map(|name| InputFile {
                file_id: name.clone(),
                path: input_dir.join(name),
            })
            .collect()
    };
    if inputs.is_empty() {
        return Err(anyhow!("no input files configured"));
    }
    check_unique_basenames(&inputs)?;

    let build_command = config
        .build
        .as_ref()
        .filter(|b| !b.command.is_empty())
        .map(|b| resolve_command(&b.command, base_dir));

    Ok(RunSettings {
        codec_command: resolve_command(&config.codec.command, base_dir),
        width: config.codec.width,
        decompress_with_mode_flags: config.codec.decompress_with_mode_flags,
        build_command,
        build_timeout: config
            .build
            .as_ref()
            .and_then(|b| timeout_from_secs(b.timeout_seconds)),
        base_dir: base_dir.to_path_buf(),
        inputs,
        output_dir,
        decompressed_dir,
        report_dir: base_dir.join(&config.paths.report_dir),
        jobs: config.execution.jobs,
        timeout: timeout_from_secs(config.execution.timeout_seconds),
        measure_times: config.execution.measure_times,
    })
}

pub fn discover_inputs(input_dir: &Path) -> Result<Vec<InputFile>> {
    if !input_dir.is_dir() {
        return Err(anyhow!(
            "input_dir {} is not a directory",
            input_dir.display()
        ));
    }
    let mut inputs = Vec::new();
    for entry in WalkDir::new(input_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        inputs.push(InputFile {
            file_id: entry.file_name().to_string_lossy().to_string(),
            path: entry.path().to_path_buf(),
        });
    }
    Ok(inputs)
}

fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

// Artifact paths are keyed by basename, so two inputs sharing one would
// overwrite each other's outputs.
fn check_unique_basenames(inputs: &[InputFile]) -> Result<()> {
    let mut seen: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for input in inputs {
        seen.entry(base_name(&input.file_id))
            .or_default()
            .push(input.file_id.as_str());
    }
    let clashes: Vec<String> = seen
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(name, ids)| format!("{} <- [{}]", name, ids.join(", ")))
        .collect();
    if clashes.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "input files must have distinct basenames:\n  {}",
            clashes.join("\n  ")
        ))
    }
}

fn resolve_command(command: &[String], base_dir: &Path) -> Vec<String> {
    let mut out = command.to_vec();
    if let Some(first) = out.first_mut() {
        if command_part_looks_like_path(first) && !Path::new(first.as_str()).is_absolute() {
            *first = base_dir.join(first.as_str()).to_string_lossy().to_string();
        }
    }
    out
}

fn command_part_looks_like_path(part: &str) -> bool {
    part.starts_with("./") || part.starts_with("../") || part.contains('/')
}

fn validate_required_fields(json_value: &Value) -> Result<()> {
    let mut problems = Vec::new();

    match json_value.pointer("/codec/command") {
        Some(Value::Array(items))
            if !items.is_empty()
                && items
                    .iter()
                    .all(|v| v.as_str().is_some_and(|s| !s.trim().is_empty())) => {}
        _ => problems.push("/codec/command (non-empty list of strings)".to_string()),
    }
    if let Some(width) = json_value.pointer("/codec/width") {
        if width.as_u64().map_or(true, |w| w == 0 || w > u32::MAX as u64) {
            problems.push("/codec/width (positive integer)".to_string());
        }
    }
    let discover = json_value
        .pointer("/discover")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if !discover {
        let has_files = json_value
            .pointer("/files")
            .and_then(|v| v.as_array())
            .is_some_and(|a| !a.is_empty());
        if !has_files {
            problems.push("/files (non-empty list, or set discover: true)".to_string());
        }
    }
    if let Some(jobs) = json_value.pointer("/execution/jobs") {
        if jobs.as_u64().map_or(true, |j| j == 0) {
            problems.push("/execution/jobs (integer >= 1)".to_string());
        }
    }
    if let Some(build) = json_value.pointer("/build/command") {
        if !build.as_array().is_some_and(|a| a.iter().all(|v| v.is_string())) {
            problems.push("/build/command (list of strings)".to_string());
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "invalid benchmark config; missing or invalid fields:\n  {}",
            problems.join("\n  ")
        ))
    }
}

pub const CONFIG_TEMPLATE: &str = "\
version: '0.1'
codec:
  command: [./lz_codec]               # REQUIRED: codec executable plus leading args
  width: 512
  decompress_with_mode_flags: false   # codec header records -a/-m
build:
  command: [make]                     # run before any trial; failure aborts the run
paths:
  input_dir: tests/in/kko.proj.data
  output_dir: tests/out
  decompressed_dir: tests/in/kko.proj.data
  report_dir: .bench/runs
files: [cb.raw, cb2.raw, df1h.raw, df1hvx.raw, df1v.raw, shp.raw, shp1.raw, shp2.raw, nk01.raw]
discover: false                       # true: use every regular file in input_dir
execution:
  jobs: 1
  timeout_seconds: 0                  # per codec invocation, 0 = unlimited
  measure_times: true
";

#[derive(Debug, Clone, Serialize)]
pub struct BenchSummary {
    pub codec_command: Vec<String>,
    pub codec_resolved: bool,
    pub width: u32,
    pub files: usize,
    pub missing_inputs: Vec<PathBuf>,
    pub configurations: Vec<String>,
    pub total_trials: usize,
    pub jobs: usize,
    pub timeout_seconds: Option<f64>,
    pub build_command: Option<Vec<String>>,
    pub output_dir: PathBuf,
    pub decompressed_dir: PathBuf,
    pub report_dir: PathBuf,
}

pub fn describe_settings(settings: &RunSettings) -> BenchSummary {
    let program = settings.codec_command.first().cloned().unwrap_or_default();
    let codec_resolved = if command_part_looks_like_path(&program) {
        Path::new(&program).is_file()
    } else {
        // Bare names resolve at launch time; a build step may also create it.
        true
    };
    BenchSummary {
        codec_command: settings.codec_command.clone(),
        codec_resolved,
        width: settings.width,
        files: settings.inputs.len(),
        missing_inputs: settings
            .inputs
            .iter()
            .filter(|i| !i.path.is_file())
            .map(|i| i.path.clone())
            .collect(),
        configurations: crate::matrix::canonical_configurations(settings.width)
            .iter()
            .map(|c| c.label().to_string())
            .collect(),
        total_trials: settings.total_trials(),
        jobs: settings.jobs,
        timeout_seconds: settings.timeout.map(|t| t.as_secs_f64()),
        build_command: settings.build_command.clone(),
        output_dir: settings.output_dir.clone(),
        decompressed_dir: settings.decompressed_dir.clone(),
        report_dir: settings.report_dir.clone(),
    }
}
