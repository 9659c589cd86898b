pub mod config;
pub mod matrix;
pub mod run;
pub mod trial;

pub use config::{
    describe_settings, load_config, BenchConfig, BenchSummary, InputFile, RunOverrides,
    RunSettings, CONFIG_TEMPLATE, DEFAULT_WIDTH,
};
pub use matrix::{canonical_configurations, plan_matrix, TrialSpec};
pub use run::{run_benchmark, run_build, run_matrix, RunResult};
pub use trial::execute_trial;

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::Utc;
    use std::fs;
    use std::path::{Path, PathBuf};

    pub fn temp_root(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "codec_runner_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&root).expect("temp dir");
        root
    }

    pub fn write_stub(root: &Path, name: &str, body: &str) -> Vec<String> {
        let path = root.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}", body)).expect("write stub");
        vec!["sh".to_string(), path.to_string_lossy().to_string()]
    }

    pub fn copy_stub(root: &Path) -> Vec<String> {
        write_stub(
            root,
            "copy_codec.sh",
            "in=\"\"; out=\"\"\nwhile [ $# -gt 0 ]; do\n  case \"$1\" in\n    -i) in=\"$2\"; shift 2;;\n    -o) out=\"$2\"; shift 2;;\n    -w) shift 2;;\n    *) shift;;\n  esac\ndone\ncp \"$in\" \"$out\"\n",
        )
    }
}
