use crate::config::RunSettings;
use crate::matrix::{plan_matrix, TrialSpec};
use crate::trial::execute_trial;
use anyhow::{anyhow, Result};
use chrono::Utc;
use codec_core::{
    atomic_write_json_pretty, ensure_dir, measure_file_entropy, run_command, sha256_file,
    CancelToken, EntropyMeasurement, ProcessOptions,
};
use codec_report::{BenchmarkReport, TrialResult};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::mpsc;
use tracing::{info, warn};

pub struct RunResult {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub report_path: PathBuf,
    pub report: BenchmarkReport,
}

pub fn run_benchmark(settings: &RunSettings, cancel: &CancelToken) -> Result<RunResult> {
    run_build(settings, cancel)?;

    let run_id = format!("run_{}", Utc::now().format("%Y%m%d_%H%M%S"));
    let mut run_dir = settings.report_dir.join(&run_id);
    let mut attempt = 1;
    while run_dir.exists() {
        run_dir = settings.report_dir.join(format!("{}_{}", run_id, attempt));
        attempt += 1;
    }
    let run_id = run_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or(run_id);
    ensure_dir(&run_dir)?;
    atomic_write_json_pretty(
        &run_dir.join("resolved_settings.json"),
        &serde_json::to_value(settings)?,
    )?;

    let report = run_matrix(settings, &run_id, cancel)?;

    let report_path = run_dir.join("report.json");
    atomic_write_json_pretty(&report_path, &serde_json::to_value(&report)?)?;
    atomic_write_json_pretty(
        &run_dir.join("manifest.json"),
        &json!({
            "schema_version": "run_manifest_v1",
            "run_id": run_id,
            "runner_version": env!("CARGO_PKG_VERSION"),
            "created_at": report.created_at.to_rfc3339(),
            "config_digest": report.config_digest,
            "total_planned": report.total_planned,
            "completed": report.trials.len(),
            "failure_count": report.failure_count,
            "cancelled": report.cancelled,
            "codec_digest": codec_digest(settings),
            "inputs": input_digests(settings),
        }),
    )?;
    info!(
        run_id = %run_id,
        trials = report.trials.len(),
        failures = report.failure_count,
        "run finished"
    );

    Ok(RunResult {
        run_id,
        run_dir,
        report_path,
        report,
    })
}

pub fn run_matrix(settings: &RunSettings, run_id: &str, cancel: &CancelToken) -> Result<BenchmarkReport> {
    preflight_inputs(settings)?;
    ensure_dir(&settings.output_dir)?;
    ensure_dir(&settings.decompressed_dir)?;

    let entropies = measure_entropies(settings);
    let specs = plan_matrix(settings, &entropies);
    let options = ProcessOptions {
        timeout: settings.timeout,
        cancel: Some(cancel.clone()),
        current_dir: None,
    };
    info!(
        files = settings.inputs.len(),
        trials = specs.len(),
        jobs = settings.jobs,
        "starting benchmark matrix"
    );

    let trials = if settings.jobs <= 1 || specs.len() <= 1 {
        execute_sequential(&specs, &options, cancel)
    } else {
        execute_pooled(&specs, &options, cancel, settings.jobs)?
    };

    let cancelled = cancel.is_cancelled();
    if cancelled {
        warn!(
            completed = trials.len(),
            planned = specs.len(),
            "run interrupted; reporting partial results"
        );
    }
    Ok(
        BenchmarkReport::from_trials(run_id, trials, specs.len(), cancelled)
            .with_config_digest(settings.digest()),
    )
}

fn execute_sequential(
    specs: &[TrialSpec],
    options: &ProcessOptions,
    cancel: &CancelToken,
) -> Vec<TrialResult> {
    let mut results = Vec::with_capacity(specs.len());
    for spec in specs {
        if cancel.is_cancelled() {
            break;
        }
        results.push(run_one(spec, options));
    }
    results
}

fn execute_pooled(
    specs: &[TrialSpec],
    options: &ProcessOptions,
    cancel: &CancelToken,
    jobs: usize,
) -> Result<Vec<TrialResult>> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(jobs.min(specs.len()))
        .build()
        .map_err(|e| anyhow!("failed to build trial worker pool: {}", e))?;

    let (tx, rx) = mpsc::channel();
    pool.install(|| {
        specs.par_iter().for_each_with(tx, |tx, spec| {
            if cancel.is_cancelled() {
                return;
            }
            let _ = tx.send(run_one(spec, options));
        });
    });

    let mut results: Vec<TrialResult> = rx.into_iter().collect();
    results.sort_by_key(|r| r.index);
    Ok(results)
}

fn run_one(spec: &TrialSpec, options: &ProcessOptions) -> TrialResult {
    info!(index = spec.index, trial = %spec.description(), "running trial");
    let result = execute_trial(spec, options);
    info!(
        index = result.index,
        ok = result.succeeded,
        compressed = ?result.compressed_size_bytes,
        "trial finished"
    );
    result
}

fn codec_digest(settings: &RunSettings) -> Option<String> {
    let program = settings.codec_command.first()?;
    let path = std::path::Path::new(program);
    if path.is_file() {
        sha256_file(path).ok()
    } else {
        None
    }
}

fn input_digests(settings: &RunSettings) -> Vec<serde_json::Value> {
    settings
        .inputs
        .iter()
        .map(|input| {
            json!({
                "file_id": input.file_id,
                "path": input.path.display().to_string(),
                "sha256": sha256_file(&input.path).ok(),
            })
        })
        .collect()
}

pub fn measure_entropies(settings: &RunSettings) -> BTreeMap<String, f64> {
    let mut entropies = BTreeMap::new();
    for input in &settings.inputs {
        let measurement = measure_file_entropy(&input.path);
        if let EntropyMeasurement::Missing = measurement {
            warn!(file = %input.path.display(), "input missing; entropy recorded as 0.0");
        }
        entropies.insert(input.file_id.clone(), measurement.bits_per_symbol());
    }
    entropies
}

fn preflight_inputs(settings: &RunSettings) -> Result<()> {
    let missing: Vec<String> = settings
        .inputs
        .iter()
        .filter(|i| !i.path.is_file())
        .map(|i| i.path.display().to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "input files not found:\n  {}",
            missing.join("\n  ")
        ))
    }
}

pub fn run_build(settings: &RunSettings, cancel: &CancelToken) -> Result<()> {
    let Some(command) = settings.build_command.as_ref() else {
        return Ok(());
    };
    let Some((program, args)) = command.split_first() else {
        return Ok(());
    };
    info!(command = ?command, "building codec");
    let options = ProcessOptions {
        timeout: settings.build_timeout,
        cancel: Some(cancel.clone()),
        current_dir: Some(settings.base_dir.clone()),
    };
    let out = run_command(program, args, &options);
    if !out.success() {
        return Err(anyhow!(
            "build command {:?} failed (exit {}):\n{}",
            command,
            out.exit_code,
            out.stderr
        ));
    }
    Ok(())
}
