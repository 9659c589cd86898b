use crate::config::{RunSettings, DEFAULT_WIDTH};
use codec_report::Configuration;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub fn canonical_configurations(width: u32) -> [Configuration; 4] {
    [(false, false), (false, true), (true, false), (true, true)].map(
        |(uses_adaptive_model, uses_preprocessing)| Configuration {
            uses_adaptive_model,
            uses_preprocessing,
            width,
        },
    )
}

pub(crate) fn base_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string())
}

pub fn is_artifact_name(name: &str) -> bool {
    canonical_configurations(DEFAULT_WIDTH).iter().any(|cfg| {
        let suffix = cfg.suffix();
        name.ends_with(&format!("{}.lz", suffix))
            || name.ends_with(&format!("-decompressed{}", suffix))
    })
}

pub fn compressed_path(output_dir: &Path, file_name: &str, cfg: &Configuration) -> PathBuf {
    output_dir.join(format!("{}{}.lz", base_name(file_name), cfg.suffix()))
}

pub fn decompressed_path(decompressed_dir: &Path, file_name: &str, cfg: &Configuration) -> PathBuf {
    decompressed_dir.join(format!("{}-decompressed{}", base_name(file_name), cfg.suffix()))
}

pub fn compress_args(input: &Path, output: &Path, cfg: &Configuration) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-o".to_string(),
        output.to_string_lossy().to_string(),
        "-w".to_string(),
        cfg.width.to_string(),
        "-c".to_string(),
    ];
    push_mode_flags(&mut args, cfg);
    args
}

pub fn decompress_args(
    input: &Path,
    output: &Path,
    cfg: &Configuration,
    with_mode_flags: bool,
) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-o".to_string(),
        output.to_string_lossy().to_string(),
        "-d".to_string(),
    ];
    if with_mode_flags {
        push_mode_flags(&mut args, cfg);
    }
    args
}

fn push_mode_flags(args: &mut Vec<String>, cfg: &Configuration) {
    if cfg.uses_adaptive_model {
        args.push("-a".to_string());
    }
    if cfg.uses_preprocessing {
        args.push("-m".to_string());
    }
}

#[derive(Debug, Clone)]
pub struct TrialSpec {
    pub index: usize,
    pub file_id: String,
    pub configuration: Configuration,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub decompressed_path: PathBuf,
    pub codec_command: Vec<String>,
    pub compress_args: Vec<String>,
    pub decompress_args: Vec<String>,
    pub entropy_bits_per_symbol: f64,
    pub measure_times: bool,
}

impl TrialSpec {
    pub fn description(&self) -> String {
        format!("{} ({})", self.file_id, self.configuration.label())
    }
}

pub fn plan_matrix(settings: &RunSettings, entropies: &BTreeMap<String, f64>) -> Vec<TrialSpec> {
    let configurations = canonical_configurations(settings.width);
    let mut specs = Vec::with_capacity(settings.total_trials());
    for input in &settings.inputs {
        let entropy = entropies.get(&input.file_id).copied().unwrap_or(0.0);
        for cfg in &configurations {
            let output_path = compressed_path(&settings.output_dir, &input.file_id, cfg);
            let decompressed_path =
                decompressed_path(&settings.decompressed_dir, &input.file_id, cfg);
            specs.push(TrialSpec {
                index: specs.len(),
                file_id: input.file_id.clone(),
                configuration: *cfg,
                compress_args: compress_args(&input.path, &output_path, cfg),
                decompress_args: decompress_args(
                    &output_path,
                    &decompressed_path,
                    cfg,
                    settings.decompress_with_mode_flags,
                ),
                input_path: input.path.clone(),
                output_path,
                decompressed_path,
                codec_command: settings.codec_command.clone(),
                entropy_bits_per_symbol: entropy,
                measure_times: settings.measure_times,
            });
        }
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputFile;
    use std::collections::BTreeSet;

    fn settings_for(files: &[&str]) -> RunSettings {
        RunSettings::new(
            vec!["./lz_codec".to_string()],
            files
                .iter()
                .map(|f| InputFile {
                    file_id: f.to_string(),
                    path: PathBuf::from("data").join(f),
                })
                .collect(),
            PathBuf::from("out"),
            PathBuf::from("dec"),
        )
    }

    #[test]
    fn canonical_order_is_fixed() {
        let cfgs = canonical_configurations(64);
        let suffixes: Vec<&str> = cfgs.iter().map(|c| c.suffix()).collect();
        assert_eq!(suffixes, vec!["_static", "_static_m", "_adaptive", "_adaptive_m"]);
        assert!(cfgs.iter().all(|c| c.width == 64));
    }

    #[test]
    fn paths_follow_naming_scheme() {
        let cfg = canonical_configurations(512)[1];
        assert_eq!(
            compressed_path(Path::new("tests/out"), "cb.raw", &cfg),
            PathBuf::from("tests/out/cb.raw_static_m.lz")
        );
        assert_eq!(
            decompressed_path(Path::new("tests/dec"), "nested/cb.raw", &cfg),
            PathBuf::from("tests/dec/cb.raw-decompressed_static_m")
        );
    }

    #[test]
    fn paths_never_collide_across_configurations() {
        let mut seen = BTreeSet::new();
        for cfg in canonical_configurations(512) {
            assert!(seen.insert(compressed_path(Path::new("o"), "f", &cfg)));
            assert!(seen.insert(decompressed_path(Path::new("o"), "f", &cfg)));
        }
        assert_eq!(seen.len(), 8);
    }

    #[test]
    fn compress_args_carry_width_and_mode_flags() {
        let [stat, stat_m, adapt, adapt_m] = canonical_configurations(512);
        let input = Path::new("in.raw");
        let output = Path::new("out.lz");
        assert_eq!(
            compress_args(input, output, &stat),
            vec!["-i", "in.raw", "-o", "out.lz", "-w", "512", "-c"]
        );
        assert_eq!(compress_args(input, output, &stat_m).last().map(String::as_str), Some("-m"));
        assert_eq!(compress_args(input, output, &adapt).last().map(String::as_str), Some("-a"));
        assert_eq!(
            &compress_args(input, output, &adapt_m)[6..],
            &["-c".to_string(), "-a".to_string(), "-m".to_string()]
        );
    }

    #[test]
    fn decompress_args_omit_mode_flags_unless_requested() {
        let adapt_m = canonical_configurations(512)[3];
        let input = Path::new("out.lz");
        let output = Path::new("dec");
        assert_eq!(
            decompress_args(input, output, &adapt_m, false),
            vec!["-i", "out.lz", "-o", "dec", "-d"]
        );
        assert_eq!(
            decompress_args(input, output, &adapt_m, true),
            vec!["-i", "out.lz", "-o", "dec", "-d", "-a", "-m"]
        );
    }

    #[test]
    fn plan_is_file_major_configuration_minor() {
        let settings = settings_for(&["a.raw", "b.raw", "c.raw"]);
        let mut entropies = BTreeMap::new();
        entropies.insert("b.raw".to_string(), 4.5);
        let plan = plan_matrix(&settings, &entropies);
        assert_eq!(plan.len(), 12);
        for (i, spec) in plan.iter().enumerate() {
            assert_eq!(spec.index, i);
            assert_eq!(spec.file_id, ["a.raw", "b.raw", "c.raw"][i / 4]);
            assert_eq!(spec.configuration, canonical_configurations(512)[i % 4]);
        }
        assert_eq!(plan[4].entropy_bits_per_symbol, 4.5);
        assert_eq!(plan[0].entropy_bits_per_symbol, 0.0);
        assert_eq!(plan[5].description(), "b.raw (static + preprocess)");
        assert_eq!(plan[5].decompress_args[1], plan[5].output_path.to_string_lossy());
    }
}
