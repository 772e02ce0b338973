//! JSONL records for keyed examples and their scores.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use burn::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use vae::{row_to_tensor, rows_to_tensor};

/// Feature payload of one keyed example.
///
/// A flat array is one example. A nested array is a stack of rows; only a
/// single row is scoreable, larger stacks are rejected by the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Features {
    Single(Vec<f32>),
    Rows(Vec<Vec<f32>>),
}

impl Features {
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> anyhow::Result<Tensor<B, 2>> {
        match self {
            Self::Single(row) => row_to_tensor(row, device),
            Self::Rows(rows) => rows_to_tensor(rows, device),
        }
    }
}

/// One input line: `{"key": ..., "features": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleRecord {
    pub key: String,
    pub features: Features,
}

/// One output line: `{"key": ..., "score": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub key: String,
    pub score: f64,
}

/// Read a JSONL file, one record per non-blank line.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid record", path.display(), i + 1))?;
        records.push(record);
    }
    tracing::info!(count = records.len(), path = %path.display(), "Read records");
    Ok(records)
}

/// Write records as JSONL, replacing any existing file.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    tracing::info!(count = records.len(), path = %path.display(), "Wrote records");
    Ok(())
}
