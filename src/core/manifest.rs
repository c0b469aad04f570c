//! Manifest rendering seams.
//!
//! Rendering, schema validation and descriptive-record loading are
//! collaborators of the packager. Each sits behind a trait. The defaults
//! here are deliberately small; richer implementations plug in through
//! [`crate::core::Packager::with_collaborators`].

mod placeholder;
mod rdf;
mod validator;

pub use placeholder::PlaceholderRenderer;
pub use rdf::{JsonRdfLoader, RdfRecord};
pub use validator::WellFormedValidator;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::core::directory::DirectoryModel;
use crate::core::metadata::MetadataAssembler;
use crate::core::models::{AccountId, AipStructure, TransferRecord};

/// Produces a fresh timestamp each time a template asks for one.
pub type TimestampFn = fn() -> String;

/// Current UTC time, ISO-8601 with a `Z` suffix.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Snapshot of the packager's state handed to templates.
#[derive(Debug, Clone, Serialize)]
pub struct PackagerState {
    pub account_id: AccountId,
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    pub structure: AipStructure,
    pub transfers: TransferRecord,
    pub charset: String,
}

/// Variables available to a manifest template.
pub struct ManifestContext<'a> {
    pub timestamp: TimestampFn,
    pub state: &'a PackagerState,
    pub listing: Option<&'a str>,
    pub directory: Option<&'a DirectoryModel>,
    pub metadata: Option<&'a MetadataAssembler>,
    pub rdf: Option<&'a [RdfRecord]>,
}

pub trait ManifestRenderer {
    /// Render `template` into `output` and return the rendered text.
    fn render(
        &self,
        template: &Path,
        output: &Path,
        charset: &str,
        context: &ManifestContext<'_>,
    ) -> Result<String>;
}

pub trait SchemaValidator {
    fn validate(&self, xml: &str) -> bool;
}

pub trait RdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<RdfRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_utc_timestamp_is_iso_with_z() {
        let ts = utc_timestamp();
        assert!(ts.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
