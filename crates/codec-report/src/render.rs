use crate::{BenchmarkReport, ReportRow};
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub fn to_json_value(report: &BenchmarkReport) -> Result<Value> {
    Ok(serde_json::to_value(report)?)
}

pub fn read_report(path: &Path) -> Result<BenchmarkReport> {
    let bytes = fs::read(path)
        .map_err(|e| anyhow!("failed to read report {}: {}", path.display(), e))?;
    let report: BenchmarkReport = serde_json::from_slice(&bytes)?;
    if report.schema_version != "benchmark_report_v1" {
        return Err(anyhow!(
            "unsupported report schema_version '{}' in {}",
            report.schema_version,
            path.display()
        ));
    }
    Ok(report)
}

const TEXT_HEADERS: [&str; 8] = [
    "Test",
    "Original(B)",
    "Compressed(B)",
    "Ratio(%)",
    "Entropy",
    "OK?",
    "Comp(s)",
    "Decomp(s)",
];

pub fn render_text(report: &BenchmarkReport) -> String {
    let rows: Vec<[String; 8]> = report.rows().iter().map(text_cells).collect();
    let mut widths = TEXT_HEADERS.map(str::len);
    for cells in &rows {
        for (w, cell) in widths.iter_mut().zip(cells.iter()) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    push_text_line(&mut out, &TEXT_HEADERS.map(String::from), &widths);
    let rule_len = widths.iter().sum::<usize>() + 2 * (widths.len() - 1);
    let _ = writeln!(out, "{}", "-".repeat(rule_len));
    for cells in &rows {
        push_text_line(&mut out, cells, &widths);
    }
    out.push('\n');
    push_footer(&mut out, report);
    out
}

fn text_cells(row: &ReportRow) -> [String; 8] {
    [
        row.description.clone(),
        row.original_size_text.clone(),
        row.compressed_size_text.clone(),
        row.ratio_text.clone(),
        row.entropy_text.clone(),
        row.status_label.clone(),
        row.compression_text.clone(),
        row.decompression_text.clone(),
    ]
}

fn push_text_line(out: &mut String, cells: &[String; 8], widths: &[usize; 8]) {
    let mut line = String::new();
    for (i, (cell, w)) in cells.iter().zip(widths.iter()).enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        if i == 0 || i == 5 {
            let _ = write!(line, "{:<width$}", cell, width = w);
        } else {
            let _ = write!(line, "{:>width$}", cell, width = w);
        }
    }
    let _ = writeln!(out, "{}", line.trim_end());
}

pub fn render_latex(report: &BenchmarkReport) -> String {
    let mut out = String::new();
    out.push_str("\\begin{tabular}{lrrrrrrr}\n");
    out.push_str("\\hline\n");
    out.push_str(
        "Test & Original(B) & Compressed(B) & Ratio(\\%) & Entropy & OK? & Times(s)\\\\\n",
    );
    out.push_str("\\hline\n");
    for row in report.rows() {
        let _ = writeln!(
            out,
            "{} & {} & {} & {} & {} & {} & C:{} D:{} \\\\",
            latex_escape(&row.description),
            row.original_size_text,
            row.compressed_size_text,
            row.ratio_text,
            row.entropy_text,
            row.status_label,
            row.compression_text,
            row.decompression_text
        );
    }
    out.push_str("\\hline\n");
    out.push_str("\\end{tabular}\n\n");
    push_footer(&mut out, report);
    out
}

fn push_footer(out: &mut String, report: &BenchmarkReport) {
    if report.cancelled {
        let _ = writeln!(
            out,
            "Run interrupted: {} of {} trials were not started.",
            report.skipped_count(),
            report.total_planned
        );
    }
    let status = report.overall_status();
    if report.cancelled && status.is_success() {
        let _ = writeln!(out, "No completed trial failed; the run is incomplete.");
    } else {
        let _ = writeln!(out, "{}", status);
    }
}

fn latex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '_' | '&' | '%' | '#' | '$' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '\\' => out.push_str("\\textbackslash{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            '~' => out.push_str("\\textasciitilde{}"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{passing, trial};
    use crate::TrialError;
    use chrono::Utc;

    fn sample_report() -> BenchmarkReport {
        let mut failed = trial(1, "cb_2.raw", true, true);
        failed.original_size_bytes = Some(10);
        failed.fail(TrialError::CompressionFailure {
            exit_code: 2,
            stderr: "boom".to_string(),
        });
        BenchmarkReport::from_trials("run_test", vec![passing(0, "cb.raw"), failed], 2, false)
    }

    #[test]
    fn text_table_lists_rows_and_status() {
        let text = render_text(&sample_report());
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Test"), "header: {}", lines[0]);
        assert!(lines[2].starts_with("cb.raw (static)"), "row: {}", lines[2]);
        assert!(lines[2].contains("25.00"));
        assert!(lines[3].contains("FAIL"));
        assert!(text.ends_with("There were 1 failing tests. See above for details.\n"));
    }

    #[test]
    fn latex_table_escapes_and_formats_times() {
        let latex = render_latex(&sample_report());
        assert!(latex.starts_with("\\begin{tabular}{lrrrrrrr}\n"));
        assert!(latex.contains("cb.raw (static) & 1000 & 250 & 25.00 & 3.25 & OK & C:0.012 D:0.005 \\\\"));
        assert!(latex.contains("cb\\_2.raw (adaptive + preprocess) & 10 & - & - & 3.25 & FAIL"));
        assert!(latex.contains("\\end{tabular}"));
    }

    #[test]
    fn cancelled_report_mentions_skipped_trials() {
        let report =
            BenchmarkReport::from_trials("run_c", vec![passing(0, "cb.raw")], 8, true);
        let text = render_text(&report);
        assert!(text.contains("Run interrupted: 7 of 8 trials were not started."), "{}", text);
        assert!(!text.contains("All tests appear to have succeeded."), "{}", text);
        assert!(text.ends_with("No completed trial failed; the run is incomplete.\n"));
    }

    #[test]
    fn cancelled_report_with_failures_keeps_failure_count() {
        let mut failed = trial(1, "cb.raw", false, true);
        failed.fail(TrialError::ContentMismatch);
        let report = BenchmarkReport::from_trials(
            "run_c",
            vec![passing(0, "cb.raw"), failed],
            8,
            true,
        );
        let latex = render_latex(&report);
        assert!(latex.contains("Run interrupted: 6 of 8 trials were not started."));
        assert!(latex.ends_with("There were 1 failing tests. See above for details.\n"));
    }

    #[test]
    fn latex_escapes_backslash_caret_and_tilde() {
        assert_eq!(
            latex_escape("a\\b^c~d_e"),
            "a\\textbackslash{}b\\textasciicircum{}c\\textasciitilde{}d\\_e"
        );
    }

    #[test]
    fn report_json_survives_disk_round_trip() {
        let dir = std::env::temp_dir().join(format!(
            "codec_report_json_{}_{}",
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&dir).expect("dir");
        let path = dir.join("report.json");
        let report = sample_report().with_config_digest("sha256:abc".to_string());
        fs::write(&path, serde_json::to_vec_pretty(&report).expect("encode")).expect("write");
        let back = read_report(&path).expect("read");
        let mut tampered = serde_json::to_value(&report).expect("value");
        tampered["schema_version"] = Value::from("benchmark_report_v0");
        fs::write(&path, serde_json::to_vec(&tampered).expect("encode")).expect("rewrite");
        assert!(read_report(&path).is_err());
        assert_eq!(back.run_id, "run_test");
        assert_eq!(back.failure_count, 1);
        assert_eq!(back.config_digest.as_deref(), Some("sha256:abc"));
        assert_eq!(back.trials[1].error, report.trials[1].error);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn json_value_exposes_structured_rows() {
        let value = to_json_value(&sample_report()).expect("json");
        assert_eq!(value["failure_count"], 1);
        assert_eq!(value["trials"][0]["ratio_percent"], 25.0);
        assert!(value["trials"][1]["compressed_size_bytes"].is_null());
        assert_eq!(value["trials"][1]["error"]["kind"], "compression_failure");
    }
}
