use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::RdfLoader;

/// One externally supplied descriptive record (field → value).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RdfRecord {
    pub fields: BTreeMap<String, String>,
}

/// Loads records from a JSON array of flat objects, e.g. one exported from
/// a spreadsheet.
#[derive(Debug, Default)]
pub struct JsonRdfLoader;

impl RdfLoader for JsonRdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<RdfRecord>> {
        info!(path = %path.display(), "Loading RDF records");

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read RDF source {}", path.display()))?;
        let rows: Vec<BTreeMap<String, serde_json::Value>> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse RDF source {}", path.display()))?;

        Ok(rows
            .into_iter()
            .map(|row| RdfRecord {
                fields: row
                    .into_iter()
                    .map(|(k, v)| {
                        let value = match v {
                            serde_json::Value::String(s) => s,
                            serde_json::Value::Null => String::new(),
                            other => other.to_string(),
                        };
                        (k, value)
                    })
                    .collect(),
            })
            .collect())
    }
}
