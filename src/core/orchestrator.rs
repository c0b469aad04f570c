use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::core::directory::DirectoryModel;
use crate::core::manifest::{
    JsonRdfLoader, ManifestContext, ManifestRenderer, PackagerState, PlaceholderRenderer,
    RdfLoader, RdfRecord, SchemaValidator, WellFormedValidator, utc_timestamp,
};
use crate::core::metadata::MetadataAssembler;
use crate::core::models::{AccountId, AipStructure, TransferRecord};
use crate::core::transfer_engine::TransferEngine;
use crate::error::Result;

/// Inputs for one packaging run.
#[derive(Debug, Clone)]
pub struct PackagerOptions {
    pub account_id: AccountId,
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    /// Primary manifest; always schema-validated.
    pub manifest_template: Option<PathBuf>,
    /// Secondary manifest; only checked for existence.
    pub manifest_list_template: Option<PathBuf>,
    pub events_log: Option<PathBuf>,
    pub rdf_source: Option<PathBuf>,
    pub charset: String,
}

impl PackagerOptions {
    pub fn new(
        account_id: AccountId,
        source_dir: impl Into<PathBuf>,
        destination_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            account_id,
            source_dir: source_dir.into(),
            destination_dir: destination_dir.into(),
            manifest_template: None,
            manifest_list_template: None,
            events_log: None,
            rdf_source: None,
            charset: "utf-8".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageOutcome {
    pub root: PathBuf,
    /// File name of the primary manifest, when one was requested.
    pub manifest: Option<String>,
    pub valid: bool,
    pub transfers: TransferRecord,
}

#[derive(Debug, Clone)]
pub struct ManifestOutput {
    pub path: PathBuf,
    pub xml: String,
}

/// Sequences assembly, snapshotting, metadata and manifest rendering for one
/// account, and folds their results into a single validity verdict.
pub struct Packager {
    options: PackagerOptions,
    renderer: Box<dyn ManifestRenderer>,
    validator: Box<dyn SchemaValidator>,
    rdf_loader: Option<Box<dyn RdfLoader>>,
    engine: Option<TransferEngine>,
    directory: Option<DirectoryModel>,
    metadata: Option<MetadataAssembler>,
    rdf: Option<Vec<RdfRecord>>,
}

impl Packager {
    pub fn new(options: PackagerOptions) -> Self {
        Self::with_collaborators(
            options,
            Box::new(PlaceholderRenderer),
            Box::new(WellFormedValidator),
            Some(Box::new(JsonRdfLoader)),
        )
    }

    pub fn with_collaborators(
        options: PackagerOptions,
        renderer: Box<dyn ManifestRenderer>,
        validator: Box<dyn SchemaValidator>,
        rdf_loader: Option<Box<dyn RdfLoader>>,
    ) -> Self {
        Self {
            options,
            renderer,
            validator,
            rdf_loader,
            engine: None,
            directory: None,
            metadata: None,
            rdf: None,
        }
    }

    pub fn options(&self) -> &PackagerOptions {
        &self.options
    }

    pub fn root(&self) -> PathBuf {
        self.options
            .destination_dir
            .join(self.options.account_id.as_str())
    }

    pub fn manifest_name(&self) -> Option<String> {
        self.options
            .manifest_template
            .as_ref()
            .map(|_| format!("{}.mets.xml", self.options.account_id))
    }

    pub fn manifest_list_name(&self) -> Option<String> {
        self.options
            .manifest_list_template
            .as_ref()
            .map(|_| format!("{}.mets.manifest", self.options.account_id))
    }

    pub fn engine(&self) -> Option<&TransferEngine> {
        self.engine.as_ref()
    }

    pub fn directory(&self) -> Option<&DirectoryModel> {
        self.directory.as_ref()
    }

    pub fn metadata(&self) -> Option<&MetadataAssembler> {
        self.metadata.as_ref()
    }

    /// Build the AIP and any configured manifests.
    ///
    /// Only precondition failures (missing source or destination, an
    /// existing AIP root) are returned as errors. Everything else lowers
    /// the validity flag of the outcome.
    pub fn package(&mut self, move_data: bool) -> Result<PackageOutcome> {
        let root = self.root();
        let _span = info_span!("package", account = %self.options.account_id).entered();
        info!(root = %root.display(), move_data = move_data, "Packaging");

        let mut engine = TransferEngine::new(
            self.options.account_id.clone(),
            &self.options.source_dir,
            &self.options.destination_dir,
        )?;
        if move_data {
            engine.assemble()?;
        }
        let is_structure_valid = engine.validate();
        let transfers = engine.transfers().clone();
        self.engine = Some(engine);

        if !is_structure_valid {
            warn!("AIP structure is invalid; continuing anyway");
        }

        if self.options.manifest_template.is_none()
            && self.options.manifest_list_template.is_none()
        {
            info!("No manifest templates passed; skipping manifest creation");
            return Ok(PackageOutcome {
                root,
                manifest: None,
                valid: is_structure_valid,
                transfers,
            });
        }

        let is_manifest_valid = match (self.manifest_name(), self.options.manifest_template.clone()) {
            (Some(name), Some(template)) => {
                info!(manifest = %name, "Creating main manifest for AIP");
                self.write_manifest(&name, &template, true).1
            }
            _ => true,
        };

        let is_list_valid = match (
            self.manifest_list_name(),
            self.options.manifest_list_template.clone(),
        ) {
            (Some(name), Some(template)) => {
                info!(manifest = %name, "Creating manifest list for AIP");
                self.write_manifest(&name, &template, false).1
            }
            _ => true,
        };

        let valid = is_structure_valid && is_manifest_valid && is_list_valid;

        if valid {
            info!("Final AIP appears to be valid");
        } else {
            warn!("Final AIP appears to be invalid; please investigate and fix the AIP");
            if !is_structure_valid {
                warn!("Couldn't create valid AIP structure; check the source files");
            }
            if !is_manifest_valid {
                warn!(
                    manifest = ?self.manifest_name(),
                    "Couldn't create valid manifest; check the manifest template"
                );
            }
            if !is_list_valid {
                warn!(
                    manifest = ?self.manifest_list_name(),
                    "Couldn't create manifest list; check the manifest list template"
                );
            }
        }

        Ok(PackageOutcome {
            root,
            manifest: self.manifest_name(),
            valid,
            transfers,
        })
    }

    /// Render `template` into `<root>/<file_name>`.
    ///
    /// With `schema_validation` the rendered text goes through the schema
    /// validator; otherwise the manifest is valid if the file was written.
    /// Failures are logged and reported as `(None, false)`.
    pub fn write_manifest(
        &mut self,
        file_name: &str,
        template: &Path,
        schema_validation: bool,
    ) -> (Option<ManifestOutput>, bool) {
        match self.try_write_manifest(file_name, template, schema_validation) {
            Ok((output, valid)) => {
                if !valid {
                    warn!(manifest = %output.path.display(), "Manifest is not valid");
                }
                (Some(output), valid)
            }
            Err(e) => {
                warn!(
                    manifest = %file_name,
                    template = %template.display(),
                    error = %format!("{:#}", e),
                    "Can't write manifest from template"
                );
                (None, false)
            }
        }
    }

    fn try_write_manifest(
        &mut self,
        file_name: &str,
        template: &Path,
        schema_validation: bool,
    ) -> anyhow::Result<(ManifestOutput, bool)> {
        let root = self.root();
        let output = root.join(file_name);

        if self.directory.is_none() {
            self.directory = Some(DirectoryModel::snapshot(&root)?);
        }

        if self.metadata.is_none() {
            if let Some(log) = &self.options.events_log {
                self.metadata = Some(MetadataAssembler::from_file(log)?);
            }
        }

        if self.rdf.is_none() {
            if let (Some(source), Some(loader)) = (&self.options.rdf_source, &self.rdf_loader) {
                self.rdf = Some(loader.load(source)?);
            }
        }

        let state = self.state();
        let listing = self.directory.as_ref().map(DirectoryModel::render);
        let context = ManifestContext {
            timestamp: utc_timestamp,
            state: &state,
            listing: listing.as_deref(),
            directory: self.directory.as_ref(),
            metadata: self.metadata.as_ref(),
            rdf: self.rdf.as_deref(),
        };

        let xml = self
            .renderer
            .render(template, &output, &self.options.charset, &context)?;

        let valid = if schema_validation {
            self.validator.validate(&xml)
        } else {
            output.is_file()
        };

        Ok((ManifestOutput { path: output, xml }, valid))
    }

    fn state(&self) -> PackagerState {
        let (structure, transfers) = match &self.engine {
            Some(engine) => (engine.structure().clone(), engine.transfers().clone()),
            None => (AipStructure::new(self.root()), TransferRecord::default()),
        };

        PackagerState {
            account_id: self.options.account_id.clone(),
            source_dir: self.options.source_dir.clone(),
            destination_dir: self.options.destination_dir.clone(),
            structure,
            transfers,
            charset: self.options.charset.clone(),
        }
    }
}
