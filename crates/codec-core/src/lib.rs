use anyhow::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{BufReader, Read, Write};
use std::path::Path;

pub mod entropy;
pub mod process;

pub use entropy::{compute_entropy, file_entropy, measure_file_entropy, EntropyMeasurement};
pub use process::{run_command, CancelToken, ProcessOptions, ProcessOutput, ProcessStatus};

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let tmp_path = path.with_extension(format!(
        "{}.tmp.{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or(""),
        std::process::id()
    ));
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn atomic_write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

pub fn file_size(path: &Path) -> Option<u64> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

pub fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    let (Some(len_a), Some(len_b)) = (file_size(a), file_size(b)) else {
        return Ok(false);
    };
    if len_a != len_b {
        return Ok(false);
    }
    let mut reader_a = BufReader::new(fs::File::open(a)?);
    let mut reader_b = BufReader::new(fs::File::open(b)?);
    let mut buf_a = vec![0u8; 64 * 1024];
    let mut buf_b = vec![0u8; 64 * 1024];
    loop {
        let n = read_full(&mut reader_a, &mut buf_a)?;
        let m = read_full(&mut reader_b, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(fs::File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

pub fn canonical_json_digest(value: &Value) -> String {
    let canonical = canonicalize(value);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    sha256_bytes(&bytes)
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for k in keys {
                sorted.insert(k.clone(), canonicalize(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::path::PathBuf;

    fn temp_root(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "codec_core_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        ensure_dir(&root).expect("temp dir");
        root
    }

    #[test]
    fn file_size_is_none_for_missing_and_directories() {
        let root = temp_root("size");
        assert_eq!(file_size(&root.join("nope")), None);
        assert_eq!(file_size(&root), None);
        fs::write(root.join("f"), b"abc").expect("write");
        assert_eq!(file_size(&root.join("f")), Some(3));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn files_identical_detects_single_byte_difference() {
        let root = temp_root("cmp");
        let mut data = vec![7u8; 200_000];
        fs::write(root.join("a"), &data).expect("write a");
        fs::write(root.join("b"), &data).expect("write b");
        assert!(files_identical(&root.join("a"), &root.join("b")).expect("cmp"));

        data[150_001] = 8;
        fs::write(root.join("c"), &data).expect("write c");
        assert!(!files_identical(&root.join("a"), &root.join("c")).expect("cmp"));
        assert!(!files_identical(&root.join("a"), &root.join("missing")).expect("cmp"));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn atomic_write_replaces_existing_content() {
        let root = temp_root("atomic");
        let path = root.join("nested").join("out.json");
        atomic_write_bytes(&path, b"first").expect("first write");
        atomic_write_json_pretty(&path, &json!({"k": 1})).expect("second write");
        let text = fs::read_to_string(&path).expect("read");
        assert!(text.contains("\"k\": 1"), "unexpected content: {}", text);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn canonical_digest_ignores_key_order() {
        let a = json!({"b": 1, "a": {"y": 2, "x": [1, 2]}});
        let b = json!({"a": {"x": [1, 2], "y": 2}, "b": 1});
        assert_eq!(canonical_json_digest(&a), canonical_json_digest(&b));
        assert_ne!(canonical_json_digest(&a), canonical_json_digest(&json!({"b": 2})));
        assert!(canonical_json_digest(&a).starts_with("sha256:"));
    }

    #[test]
    fn sha256_file_matches_bytes_digest() {
        let root = temp_root("sha");
        fs::write(root.join("f"), b"hello").expect("write");
        assert_eq!(
            sha256_file(&root.join("f")).expect("digest"),
            sha256_bytes(b"hello")
        );
        let _ = fs::remove_dir_all(root);
    }
}
