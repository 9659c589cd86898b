use crate::matrix::TrialSpec;
use codec_core::{file_size, files_identical, run_command, ProcessOptions, ProcessOutput, ProcessStatus};
use codec_report::{compression_ratio, TrialError, TrialResult, TrialStage};
use std::fs;
use tracing::{debug, warn};

pub fn execute_trial(spec: &TrialSpec, options: &ProcessOptions) -> TrialResult {
    let mut res = TrialResult::new(
        spec.index,
        &spec.file_id,
        spec.configuration,
        spec.input_path.clone(),
        spec.output_path.clone(),
        spec.decompressed_path.clone(),
        spec.entropy_bits_per_symbol,
    );
    // Stale artifacts from an earlier run must not pass for fresh output.
    let _ = fs::remove_file(&spec.output_path);
    let _ = fs::remove_file(&spec.decompressed_path);

    res.original_size_bytes = file_size(&spec.input_path);

    // 1) Compression
    let out = invoke(spec, &spec.compress_args, options);
    res.compression_duration_seconds = stage_seconds(spec, &out);
    if !out.success() {
        res.fail(stage_error(TrialStage::Compression, spec, out));
        return finish(res);
    }

    // 2) Size check
    let Some(compressed) = file_size(&spec.output_path) else {
        res.fail(TrialError::MissingCompressedOutput {
            path: spec.output_path.clone(),
        });
        return finish(res);
    };
    res.compressed_size_bytes = Some(compressed);
    if let Some(original) = res.original_size_bytes {
        res.ratio_percent = compression_ratio(original, compressed);
    }

    // 3) Decompression
    let out = invoke(spec, &spec.decompress_args, options);
    res.decompression_duration_seconds = stage_seconds(spec, &out);
    if !out.success() {
        res.fail(stage_error(TrialStage::Decompression, spec, out));
        return finish(res);
    }

    // 4) Compare
    if file_size(&spec.decompressed_path).is_none() {
        res.fail(TrialError::MissingDecompressedOutput {
            path: spec.decompressed_path.clone(),
        });
        return finish(res);
    }
    match files_identical(&spec.input_path, &spec.decompressed_path) {
        Ok(true) => res.succeed(),
        Ok(false) => res.fail(TrialError::ContentMismatch),
        Err(err) => {
            warn!(trial = %res.description, error = %err, "comparison failed");
            res.fail(TrialError::ContentMismatch);
        }
    }
    finish(res)
}

fn invoke(spec: &TrialSpec, stage_args: &[String], options: &ProcessOptions) -> ProcessOutput {
    let (program, leading) = match spec.codec_command.split_first() {
        Some((program, leading)) => (program.as_str(), leading),
        None => ("", &[][..]),
    };
    let args: Vec<&str> = leading
        .iter()
        .chain(stage_args.iter())
        .map(String::as_str)
        .collect();
    debug!(program, args = ?args, "running codec");
    run_command(program, &args, options)
}

fn stage_seconds(spec: &TrialSpec, out: &ProcessOutput) -> f64 {
    if spec.measure_times {
        out.elapsed.as_secs_f64()
    } else {
        0.0
    }
}

fn stage_error(stage: TrialStage, spec: &TrialSpec, out: ProcessOutput) -> TrialError {
    match out.status {
        ProcessStatus::NotFound => TrialError::CommandNotFound {
            stage,
            program: spec.codec_command.first().cloned().unwrap_or_default(),
        },
        ProcessStatus::Cancelled => TrialError::Cancelled { stage },
        _ => match stage {
            TrialStage::Compression => TrialError::CompressionFailure {
                exit_code: out.exit_code,
                stderr: out.stderr,
            },
            TrialStage::Decompression => TrialError::DecompressionFailure {
                exit_code: out.exit_code,
                stderr: out.stderr,
            },
        },
    }
}

fn finish(res: TrialResult) -> TrialResult {
    match &res.error_message {
        None => debug!(trial = %res.description, ratio = ?res.ratio_percent, "trial passed"),
        Some(msg) => warn!(trial = %res.description, error = %msg, "trial failed"),
    }
    res
}
