//! Seed data read from a directory tree.
//!
//! Layout: `<root>/<index>/<key>.json`, one JSON object per file. Files in
//! `<root>` itself and non-JSON files are ignored.
use anyhow::{bail, Context, Result};
use scout_core::types::{Meta, Record, RecordKey};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::record_store::DELETED_AT;

#[derive(Debug, Clone, PartialEq)]
pub struct SeedDocument {
    pub index: String,
    pub key: RecordKey,
    pub source: Meta,
}

impl SeedDocument {
    /// The record the document was indexed from.
    ///
    /// A document carrying `soft_delete_field = 1` becomes a trashed record.
    pub fn to_record(&self, record_type: &str, soft_delete_field: &str) -> Record {
        let mut attributes = self.source.clone();
        let trashed = attributes.remove(soft_delete_field).and_then(|v| v.as_i64()) == Some(1);
        if trashed {
            attributes.insert(DELETED_AT.to_string(), Value::String("seeded".to_string()));
        }
        Record::new(record_type, self.key.clone(), attributes)
    }
}

pub fn read_seed_dir(root: &Path) -> Result<Vec<SeedDocument>> {
    if !root.is_dir() {
        bail!("seed directory {} does not exist", root.display());
    }
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    files.sort();

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        let index = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|s| s.to_str())
            .context("seed file has no index directory")?
            .to_string();
        let key = path
            .file_stem()
            .and_then(|s| s.to_str())
            .context("seed file has no name")?
            .to_string();
        let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let value: Value = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        let Value::Object(source) = value else {
            bail!("{} must hold a JSON object", path.display());
        };
        documents.push(SeedDocument { index, key, source });
    }
    Ok(documents)
}
