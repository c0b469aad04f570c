pub mod directory;
pub mod manifest;
pub mod metadata;
pub mod models;
pub mod orchestrator;
pub mod transfer_engine;
pub mod verifier;

pub use directory::{DirectoryModel, DirectoryNode};
pub use manifest::{
    JsonRdfLoader, ManifestContext, ManifestRenderer, PackagerState, PlaceholderRenderer,
    RdfLoader, RdfRecord, SchemaValidator, WellFormedValidator,
};
pub use metadata::{MetadataAssembler, MetadataRecord, RecordKind};
pub use models::{AccountId, AipStructure, Category, TransferRecord};
pub use orchestrator::{ManifestOutput, PackageOutcome, Packager, PackagerOptions};
pub use transfer_engine::TransferEngine;
pub use verifier::{CopiedFile, CopyCheck, verify_copy};
