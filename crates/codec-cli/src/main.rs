use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use codec_core::{measure_file_entropy, CancelToken, EntropyMeasurement};
use codec_report::BenchmarkReport;
use codec_runner::{RunOverrides, RunSettings};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "codec-bench",
    version,
    about = "Round-trip benchmark harness for an external LZ codec"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    #[value(name = "text")]
    Text,
    #[value(name = "latex")]
    Latex,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the codec, run every (file, configuration) trial and print the table.
    Run {
        config: PathBuf,
        #[arg(long)]
        jobs: Option<usize>,
        #[arg(long)]
        timeout_seconds: Option<u64>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        skip_build: bool,
        #[arg(long, value_enum, default_value = "text")]
        format: FormatArg,
        #[arg(long)]
        json: bool,
    },
    Describe {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Order-0 entropy of each file, in bits per byte.
    Entropy {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Render a saved report.json.
    Report {
        report: PathBuf,
        #[arg(long, value_enum, default_value = "text")]
        format: FormatArg,
        #[arg(long)]
        json: bool,
    },
    Init {
        #[arg(long, default_value = "bench.yaml")]
        path: PathBuf,
        #[arg(long)]
        force: bool,
    },
    /// Remove codec artifacts (and optionally saved runs) for a config.
    Clean {
        config: PathBuf,
        #[arg(long)]
        runs: bool,
    },
}

struct CommandOutcome {
    payload: Option<Value>,
    exit_code: i32,
}

impl CommandOutcome {
    fn done() -> Self {
        Self {
            payload: None,
            exit_code: 0,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    init_tracing(json_mode);
    let result = run_command(cli.command);
    match result {
        Ok(outcome) => {
            if let Some(payload) = outcome.payload {
                emit_json(&payload);
            }
            if outcome.exit_code != 0 {
                std::process::exit(outcome.exit_code);
            }
            Ok(())
        }
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing(json_mode: bool) {
    let default_level = if json_mode { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_command(command: Commands) -> Result<CommandOutcome> {
    match command {
        Commands::Run {
            config,
            jobs,
            timeout_seconds,
            width,
            skip_build,
            format,
            json,
        } => {
            let mut settings = codec_runner::load_config(&config)?;
            settings.apply_overrides(&RunOverrides {
                jobs,
                timeout_seconds,
                width,
            })?;
            if skip_build {
                settings.build_command = None;
            }

            let cancel = CancelToken::new();
            let handler_token = cancel.clone();
            if let Err(err) = ctrlc::set_handler(move || {
                handler_token.cancel();
            }) {
                warn!(error = %err, "failed to install Ctrl+C handler");
            }

            let result = codec_runner::run_benchmark(&settings, &cancel)?;
            let exit_code = if result.report.overall_status().is_success() && !result.report.cancelled {
                0
            } else {
                2
            };
            if json {
                return Ok(CommandOutcome {
                    payload: Some(json!({
                        "ok": exit_code == 0,
                        "command": "run",
                        "run_id": result.run_id,
                        "run_dir": result.run_dir.display().to_string(),
                        "report_path": result.report_path.display().to_string(),
                        "report": codec_report::to_json_value(&result.report)?,
                        "rows": serde_json::to_value(result.report.rows())?,
                    })),
                    exit_code,
                });
            }
            print_report(&result.report, format);
            println!("run_id: {}", result.run_id);
            println!("report: {}", result.report_path.display());
            Ok(CommandOutcome {
                payload: None,
                exit_code,
            })
        }
        Commands::Describe { config, json } => {
            let settings = codec_runner::load_config(&config)?;
            let summary = codec_runner::describe_settings(&settings);
            if json {
                return Ok(CommandOutcome {
                    payload: Some(json!({
                        "ok": true,
                        "command": "describe",
                        "summary": serde_json::to_value(&summary)?,
                    })),
                    exit_code: 0,
                });
            }
            println!("codec: {:?}", summary.codec_command);
            println!("codec_resolved: {}", summary.codec_resolved);
            println!("width: {}", summary.width);
            println!("files: {}", summary.files);
            println!("configurations: {}", summary.configurations.join(", "));
            println!("total_trials: {}", summary.total_trials);
            println!("jobs: {}", summary.jobs);
            match summary.timeout_seconds {
                Some(t) => println!("timeout_seconds: {}", t),
                None => println!("timeout_seconds: none"),
            }
            match &summary.build_command {
                Some(cmd) => println!("build: {:?}", cmd),
                None => println!("build: none"),
            }
            println!("output_dir: {}", summary.output_dir.display());
            println!("decompressed_dir: {}", summary.decompressed_dir.display());
            println!("report_dir: {}", summary.report_dir.display());
            for missing in &summary.missing_inputs {
                println!("missing_input: {}", missing.display());
            }
            Ok(CommandOutcome::done())
        }
        Commands::Entropy { files, json } => {
            let measurements: Vec<(PathBuf, EntropyMeasurement)> = files
                .into_iter()
                .map(|f| {
                    let m = measure_file_entropy(&f);
                    (f, m)
                })
                .collect();
            if json {
                let entries: Vec<Value> = measurements
                    .iter()
                    .map(|(path, m)| {
                        json!({
                            "file": path.display().to_string(),
                            "missing": m.is_missing(),
                            "bits_per_symbol": m.bits_per_symbol(),
                        })
                    })
                    .collect();
                return Ok(CommandOutcome {
                    payload: Some(json!({
                        "ok": true,
                        "command": "entropy",
                        "files": entries,
                    })),
                    exit_code: 0,
                });
            }
            for (path, m) in &measurements {
                match m {
                    EntropyMeasurement::Measured(bits) => {
                        println!("{}: {:.4}", path.display(), bits)
                    }
                    EntropyMeasurement::Missing => println!("{}: missing", path.display()),
                }
            }
            Ok(CommandOutcome::done())
        }
        Commands::Report {
            report,
            format,
            json,
        } => {
            let report = codec_report::read_report(&report)?;
            if json {
                return Ok(CommandOutcome {
                    payload: Some(json!({
                        "ok": true,
                        "command": "report",
                        "status": serde_json::to_value(report.overall_status())?,
                        "rows": serde_json::to_value(report.rows())?,
                    })),
                    exit_code: 0,
                });
            }
            print_report(&report, format);
            Ok(CommandOutcome::done())
        }
        Commands::Init { path, force } => {
            if !force && path.exists() {
                return Err(anyhow::anyhow!(
                    "config file already exists (use --force): {}",
                    path.display()
                ));
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, codec_runner::CONFIG_TEMPLATE)?;
            println!("wrote: {}", path.display());
            println!("next: edit {} and set codec.command", path.display());
            println!("next: codec-bench describe {}", path.display());
            Ok(CommandOutcome::done())
        }
        Commands::Clean { config, runs } => {
            let settings = codec_runner::load_config(&config)?;
            for path in artifact_paths(&settings) {
                if path.exists() {
                    std::fs::remove_file(&path)?;
                    println!("removed: {}", path.display());
                }
            }
            if runs && settings.report_dir.exists() {
                std::fs::remove_dir_all(&settings.report_dir)?;
                println!("removed: {}", settings.report_dir.display());
            }
            Ok(CommandOutcome::done())
        }
    }
}

fn artifact_paths(settings: &RunSettings) -> Vec<PathBuf> {
    codec_runner::plan_matrix(settings, &Default::default())
        .into_iter()
        .flat_map(|spec| [spec.output_path, spec.decompressed_path])
        .collect()
}

fn print_report(report: &BenchmarkReport, format: FormatArg) {
    let rendered = match format {
        FormatArg::Text => codec_report::render_text(report),
        FormatArg::Latex => codec_report::render_latex(report),
    };
    print!("{}", rendered);
    for trial in report.trials.iter().filter(|t| !t.succeeded) {
        if let Some(msg) = &trial.error_message {
            eprintln!("{}: {}", trial.description, msg.trim_end());
        }
    }
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. }
        | Commands::Describe { json, .. }
        | Commands::Entropy { json, .. }
        | Commands::Report { json, .. } => *json,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_parse_into_overrides() {
        let cli = Cli::try_parse_from([
            "codec-bench",
            "run",
            "bench.yaml",
            "--jobs",
            "4",
            "--timeout-seconds",
            "30",
            "--format",
            "latex",
            "--json",
        ])
        .expect("parse");
        match cli.command {
            Commands::Run {
                config,
                jobs,
                timeout_seconds,
                width,
                format,
                json,
                ..
            } => {
                assert_eq!(config, PathBuf::from("bench.yaml"));
                assert_eq!(jobs, Some(4));
                assert_eq!(timeout_seconds, Some(30));
                assert_eq!(width, None);
                assert!(matches!(format, FormatArg::Latex));
                assert!(json);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn entropy_requires_at_least_one_file() {
        assert!(Cli::try_parse_from(["codec-bench", "entropy"]).is_err());
        let cli = Cli::try_parse_from(["codec-bench", "entropy", "a.raw", "--json"]).expect("parse");
        assert!(command_json_mode(&cli.command));
    }

    #[test]
    fn artifact_paths_cover_both_outputs_per_cell() {
        let settings = RunSettings::new(
            vec!["codec".to_string()],
            vec![codec_runner::InputFile {
                file_id: "cb.raw".to_string(),
                path: PathBuf::from("data/cb.raw"),
            }],
            PathBuf::from("out"),
            PathBuf::from("dec"),
        );
        let paths = artifact_paths(&settings);
        assert_eq!(paths.len(), 8);
        assert_eq!(paths[0], PathBuf::from("out/cb.raw_static.lz"));
        assert_eq!(paths[1], PathBuf::from("dec/cb.raw-decompressed_static"));
    }

    #[test]
    fn json_error_envelope_shape() {
        let v = json_error("command_failed", "boom".to_string(), json!({}));
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"]["code"], "command_failed");
        assert_eq!(v["error"]["message"], "boom");
    }
}
