use crate::doc_store::StoreError;
use serde::Serialize;

/// Everything that can go wrong during a rename, per document or for the whole run.
///
/// Per-document variants are recorded in the outcome and never stop the run.
/// Discovery, preflight and relocation variants end it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenameError {
    #[error("reference discovery failed: {source}")]
    DiscoveryFailed { source: StoreError },

    #[error("failed to fetch {path}: {source}")]
    DocumentFetchFailed { path: String, source: StoreError },

    #[error("failed to write {path}: {source}")]
    DocumentWriteFailed { path: String, source: StoreError },

    #[error("old and new name both map to {path}")]
    SamePath { path: String },

    #[error("document to rename does not exist: {path}")]
    TargetNotFound { path: String },

    #[error("a document already exists at {path}")]
    DestinationExists { path: String },

    #[error("failed to read {path} for relocation: {source}")]
    RelocationFetchFailed { path: String, source: StoreError },

    #[error("failed to write relocated document to {path}: {source}")]
    RelocationWriteFailed { path: String, source: StoreError },

    /// The copy at `new_path` exists but `old_path` could not be deleted.
    /// `compensation_error` is set when removing the new copy failed too.
    #[error("failed to delete {old_path} after copying it to {new_path}: {source}")]
    RelocationDeleteFailed {
        old_path: String,
        new_path: String,
        source: StoreError,
        compensation_error: Option<StoreError>,
    },
}

impl RenameError {
    /// True when the note now exists at both paths and someone has to clean up by hand.
    pub fn is_duplicate_document(&self) -> bool {
        matches!(
            self,
            RenameError::RelocationDeleteFailed {
                compensation_error: Some(_),
                ..
            }
        )
    }
}
