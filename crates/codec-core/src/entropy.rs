use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "bits_per_symbol", rename_all = "snake_case")]
pub enum EntropyMeasurement {
    Measured(f64),
    Missing,
}

impl EntropyMeasurement {
    pub fn bits_per_symbol(&self) -> f64 {
        match self {
            EntropyMeasurement::Measured(bits) => *bits,
            EntropyMeasurement::Missing => 0.0,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, EntropyMeasurement::Missing)
    }
}

pub fn compute_entropy(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }
    let mut freq = [0u64; 256];
    for &b in bytes {
        freq[b as usize] += 1;
    }
    let total = bytes.len() as f64;
    let mut entropy = 0.0;
    for &count in freq.iter().filter(|&&c| c > 0) {
        let p = count as f64 / total;
        entropy -= p * p.log2();
    }
    entropy
}

pub fn measure_file_entropy(path: &Path) -> EntropyMeasurement {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        _ => return EntropyMeasurement::Missing,
    }
    match fs::read(path) {
        Ok(data) => EntropyMeasurement::Measured(compute_entropy(&data)),
        Err(_) => EntropyMeasurement::Missing,
    }
}

pub fn file_entropy(path: &Path) -> f64 {
    measure_file_entropy(path).bits_per_symbol()
}
