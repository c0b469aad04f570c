//! Preservation-event metadata.
//!
//! An event log is an ordered list of single-key maps:
//!
//! ```yaml
//! - "2018-05-17T12:40:52-0400":
//!     type: agent
//!     alias: pst2mime_converter
//!     name: PST Converter
//! - "2018-05-17T12:40:53-0400":
//!     type: event
//!     alias: pst2mime
//!     agent: pst2mime_converter
//! ```
//!
//! Each entry becomes a [`MetadataRecord`] in the agent, event or object
//! collection. Within a collection the alias is unique: a later record with
//! the same alias replaces the earlier one and moves to the end.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat};
use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{PackagerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Agent,
    Event,
    Object,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Event => "event",
            Self::Object => "object",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "agent" => Some(Self::Agent),
            "event" => Some(Self::Event),
            "object" => Some(Self::Object),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataRecord {
    pub alias: String,
    pub kind: RecordKind,
    /// ISO-8601, normalized from the entry key.
    pub timestamp: String,
    /// Every other field of the entry, stringified.
    pub attributes: BTreeMap<String, String>,
}

impl MetadataRecord {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetadataAssembler {
    agents: Vec<MetadataRecord>,
    events: Vec<MetadataRecord>,
    objects: Vec<MetadataRecord>,
}

impl MetadataAssembler {
    pub fn new(entries: &[Value]) -> Result<Self> {
        info!(entries = entries.len(), "Parsing preservation metadata");
        let mut assembler = Self::default();
        for entry in entries {
            assembler.insert_entry(entry)?;
        }
        Ok(assembler)
    }

    /// Load an event log (YAML or JSON) whose top level is a sequence.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading events log");

        let content = std::fs::read_to_string(path).map_err(|e| PackagerError::EventsLog {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let entries: Vec<Value> =
            serde_yaml::from_str(&content).map_err(|e| PackagerError::EventsLog {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Self::new(&entries)
    }

    /// Validate one entry and upsert it. Nothing is modified on error.
    pub fn insert_entry(&mut self, entry: &Value) -> Result<()> {
        let record = parse_entry(entry)?;
        debug!(
            kind = %record.kind,
            alias = %record.alias,
            timestamp = %record.timestamp,
            "Processing record"
        );

        let collection = self.collection_mut(record.kind);
        if let Some(pos) = collection.iter().position(|r| r.alias == record.alias) {
            warn!(
                kind = %record.kind,
                alias = %record.alias,
                "Overwriting existing record"
            );
            collection.remove(pos);
        }
        collection.push(record);
        Ok(())
    }

    pub fn agents(&self) -> &[MetadataRecord] {
        &self.agents
    }

    pub fn events(&self) -> &[MetadataRecord] {
        &self.events
    }

    pub fn objects(&self) -> &[MetadataRecord] {
        &self.objects
    }

    pub fn records(&self, kind: RecordKind) -> &[MetadataRecord] {
        match kind {
            RecordKind::Agent => &self.agents,
            RecordKind::Event => &self.events,
            RecordKind::Object => &self.objects,
        }
    }

    pub fn get(&self, kind: RecordKind, alias: &str) -> Option<&MetadataRecord> {
        self.records(kind).iter().find(|r| r.alias == alias)
    }

    /// The agent an event refers to through its `agent` attribute.
    pub fn resolve_agent(&self, event: &MetadataRecord) -> Option<&MetadataRecord> {
        event
            .attribute("agent")
            .and_then(|alias| self.get(RecordKind::Agent, alias))
    }

    pub fn len(&self) -> usize {
        self.agents.len() + self.events.len() + self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn collection_mut(&mut self, kind: RecordKind) -> &mut Vec<MetadataRecord> {
        match kind {
            RecordKind::Agent => &mut self.agents,
            RecordKind::Event => &mut self.events,
            RecordKind::Object => &mut self.objects,
        }
    }
}

fn parse_entry(entry: &Value) -> Result<MetadataRecord> {
    let Value::Mapping(map) = entry else {
        return Err(PackagerError::InvalidEntry {
            reason: "expected a single-key mapping".to_string(),
        });
    };
    if map.len() != 1 {
        return Err(PackagerError::InvalidEntry {
            reason: format!("expected 1 data item, got: {}", map.len()),
        });
    }
    let Some((key, fields)) = map.iter().next() else {
        return Err(PackagerError::InvalidEntry {
            reason: "empty entry".to_string(),
        });
    };
    let Value::String(raw_timestamp) = key else {
        return Err(PackagerError::InvalidEntry {
            reason: "timestamp key must be a string".to_string(),
        });
    };

    let timestamp = normalize_timestamp(raw_timestamp)?;

    let Value::Mapping(fields) = fields else {
        return Err(PackagerError::InvalidEntry {
            reason: format!("expected metadata for '{}' to be a mapping", raw_timestamp),
        });
    };

    let mut attributes = BTreeMap::new();
    for (k, v) in fields {
        attributes.insert(stringify(k), stringify(v));
    }

    let alias = attributes
        .remove("alias")
        .ok_or(PackagerError::MissingField { field: "alias" })?;
    let kind_value = attributes
        .remove("type")
        .ok_or(PackagerError::MissingField { field: "type" })?;
    let kind = RecordKind::parse(&kind_value)
        .ok_or(PackagerError::InvalidType { value: kind_value })?;

    if attributes.remove("timestamp").is_some() {
        warn!(alias = %alias, "Removing key 'timestamp' as it will be computed");
    }

    Ok(MetadataRecord {
        alias,
        kind,
        timestamp,
        attributes,
    })
}

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Normalize a date string to ISO-8601, keeping any UTC offset.
pub fn normalize_timestamp(value: &str) -> Result<String> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, format) {
            return Ok(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(format_naive(&dt));
        }
    }
    if let Some(dt) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(format_naive(&dt));
    }

    warn!(timestamp = %value, "Invalid timestamp");
    Err(PackagerError::InvalidTimestamp {
        value: value.to_string(),
    })
}

fn format_naive(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => stringify(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => {
            serde_json::to_string(value).unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(yaml: &str) -> Vec<Value> {
        serde_yaml::from_str(yaml).unwrap()
    }

    const SAMPLE: &str = r#"
- "2018-05-17T12:40:52-0400":
    type: agent
    alias: pst2mime_converter
    name: PST Converter
    version: 1
- "2018-05-17T12:40:53-0400":
    type: event
    alias: pst2mime
    description: PST to MIME converted.
    agent: pst2mime_converter
"#;

    #[test]
    fn test_parses_sample_log() {
        let assembler = MetadataAssembler::new(&entries(SAMPLE)).unwrap();

        assert_eq!(assembler.agents().len(), 1);
        assert_eq!(assembler.events().len(), 1);
        assert!(assembler.objects().is_empty());

        let event = &assembler.events()[0];
        assert_eq!(event.alias, "pst2mime");
        assert_eq!(event.timestamp, "2018-05-17T12:40:53-04:00");
        assert_eq!(event.attribute("agent"), Some("pst2mime_converter"));
        assert_eq!(assembler.agents()[0].attribute("version"), Some("1"));
        assert_eq!(
            assembler.resolve_agent(event).map(|a| a.alias.as_str()),
            Some("pst2mime_converter")
        );
    }

    #[test]
    fn test_duplicate_alias_last_write_wins() {
        let mut assembler = MetadataAssembler::new(&entries(
            r#"
- "2020-01-01T00:00:00Z": {type: agent, alias: a, name: first}
- "2020-01-01T00:00:01Z": {type: agent, alias: b, name: other}
"#,
        ))
        .unwrap();

        assembler
            .insert_entry(&entries(r#"- "2020-01-02T00:00:00Z": {type: agent, alias: a, name: second}"#)[0])
            .unwrap();

        let agents = assembler.agents();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].alias, "b");
        assert_eq!(agents[1].alias, "a");
        assert_eq!(agents[1].attribute("name"), Some("second"));
        assert_eq!(agents[1].timestamp, "2020-01-02T00:00:00+00:00");
    }

    #[test]
    fn test_invalid_timestamp_leaves_collections_unmodified() {
        let mut assembler = MetadataAssembler::new(&entries(SAMPLE)).unwrap();
        let before = (assembler.agents().to_vec(), assembler.events().to_vec());

        let bad = entries(r#"- "not a date": {type: object, alias: x}"#);
        let err = assembler.insert_entry(&bad[0]).unwrap_err();

        assert!(matches!(err, PackagerError::InvalidTimestamp { .. }));
        assert_eq!(assembler.agents(), before.0.as_slice());
        assert_eq!(assembler.events(), before.1.as_slice());
        assert!(assembler.objects().is_empty());
    }

    #[test]
    fn test_missing_fields() {
        let err = MetadataAssembler::new(&entries(r#"- "2020-01-01": {type: agent}"#)).unwrap_err();
        assert!(matches!(err, PackagerError::MissingField { field: "alias" }));

        let err = MetadataAssembler::new(&entries(r#"- "2020-01-01": {alias: a}"#)).unwrap_err();
        assert!(matches!(err, PackagerError::MissingField { field: "type" }));
    }

    #[test]
    fn test_invalid_type() {
        let err =
            MetadataAssembler::new(&entries(r#"- "2020-01-01": {type: person, alias: a}"#))
                .unwrap_err();
        assert!(matches!(err, PackagerError::InvalidType { value } if value == "person"));
    }

    #[test]
    fn test_invalid_entry_shapes() {
        let err = MetadataAssembler::new(&entries(r#"- "just a string""#)).unwrap_err();
        assert!(matches!(err, PackagerError::InvalidEntry { .. }));

        let err = MetadataAssembler::new(&entries(
            r#"- {"2020-01-01": {type: agent, alias: a}, "2020-01-02": {type: agent, alias: b}}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, PackagerError::InvalidEntry { .. }));

        let err = MetadataAssembler::new(&entries(r#"- "2020-01-01": [1, 2]"#)).unwrap_err();
        assert!(matches!(err, PackagerError::InvalidEntry { .. }));
    }

    #[test]
    fn test_supplied_timestamp_field_is_discarded() {
        let assembler = MetadataAssembler::new(&entries(
            r#"- "2021-03-04 05:06:07": {type: object, alias: o, timestamp: "1999-01-01"}"#,
        ))
        .unwrap();

        let object = &assembler.objects()[0];
        assert_eq!(object.timestamp, "2021-03-04T05:06:07");
        assert!(object.attribute("timestamp").is_none());
    }

    #[test]
    fn test_normalize_timestamp_forms() {
        assert_eq!(
            normalize_timestamp("2018-05-17T12:40:52-04:00").unwrap(),
            "2018-05-17T12:40:52-04:00"
        );
        assert_eq!(
            normalize_timestamp("2018-05-17 12:40:52+0000").unwrap(),
            "2018-05-17T12:40:52+00:00"
        );
        assert_eq!(
            normalize_timestamp("2018-05-17T12:40:52.250").unwrap(),
            "2018-05-17T12:40:52.250"
        );
        assert_eq!(
            normalize_timestamp("2018-05-17").unwrap(),
            "2018-05-17T00:00:00"
        );
        assert!(normalize_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_non_string_values_are_stringified() {
        let assembler = MetadataAssembler::new(&entries(
            r#"- "2020-01-01": {type: object, alias: o, size: 12, ok: true, tags: [a, b], note: null}"#,
        ))
        .unwrap();

        let object = &assembler.objects()[0];
        assert_eq!(object.attribute("size"), Some("12"));
        assert_eq!(object.attribute("ok"), Some("true"));
        assert_eq!(object.attribute("tags"), Some(r#"["a","b"]"#));
        assert_eq!(object.attribute("note"), Some(""));
    }
}
