#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Store configuration string rooted inside `tmp`.
pub fn store_spec(tmp: &TempDir, options: &str) -> String {
    let root = tmp.path().join("store");
    if options.is_empty() {
        root.display().to_string()
    } else {
        format!("{}?{options}", root.display())
    }
}

/// Write `(date, bid, ask)` rows as JSON lines.
pub fn write_jsonl(path: &Path, rows: &[(&str, f64, f64)]) -> TestResult {
    let mut text = String::new();
    for (ts, bid, ask) in rows {
        let line = serde_json::json!({ "ts": ts, "bid": bid, "ask": ask });
        text.push_str(&line.to_string());
        text.push('\n');
    }
    std::fs::write(path, text)?;
    Ok(())
}

pub fn input_path(tmp: &TempDir, name: &str) -> PathBuf {
    tmp.path().join(name)
}
