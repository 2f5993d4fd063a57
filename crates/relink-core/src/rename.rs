use crate::doc_store::{DocumentDescriptor, DocumentStore, StoreError};
use crate::error::RenameError;
use crate::link_parser::tokenize;
use crate::link_rewriter::{apply_edits, compute_rename_edits};
use crate::note_name::{find_references, NoteIdentity};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::ops::Range;
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RenameOptions {
    /// Referencing documents processed at once (at least 1).
    pub concurrency: usize,
    /// Applied to every single store call.
    pub timeout: Duration,
    /// Compute every update but write, move and delete nothing.
    pub dry_run: bool,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameRequest {
    pub old: NoteIdentity,
    pub new: NoteIdentity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RenameStatus {
    Completed,
    PartiallyCompleted,
    Aborted,
}

/// A link that references the renamed note but was left as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedMatch {
    pub document_path: String,
    pub span: Range<usize>,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentOutcome {
    /// No link in the document references the note.
    Unaffected,
    /// Links matched but the text did not change (all unresolved, or already correct).
    Unchanged,
    /// New content written (or, in a dry run, computed).
    Rewritten { links_rewritten: usize },
    Failed { error: RenameError },
}

/// The fate of one candidate document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentUpdate {
    pub path: String,
    /// `None` when the fetch failed.
    pub original_content: Option<String>,
    /// `None` when no link matched or the fetch failed. Set even if the write failed.
    pub new_content: Option<String>,
    pub outcome: DocumentOutcome,
    pub unresolved: Vec<UnresolvedMatch>,
}

impl DocumentUpdate {
    fn failed(path: &str, original_content: Option<String>, error: RenameError) -> Self {
        Self {
            path: path.to_string(),
            original_content,
            new_content: None,
            outcome: DocumentOutcome::Failed { error },
            unresolved: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelocationOutcome {
    /// The run ended before relocation.
    NotAttempted,
    /// Dry run.
    Skipped,
    Relocated { from: String, to: String },
    Failed { error: RenameError },
}

/// Full accounting of one rename run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameOutcome {
    pub request: RenameRequest,
    pub status: RenameStatus,
    pub dry_run: bool,
    /// One entry per discovered candidate, in discovery order.
    pub documents: Vec<DocumentUpdate>,
    pub relocation: RelocationOutcome,
    /// Why the run stopped early, when it did.
    pub abort_reason: Option<RenameError>,
}

impl RenameOutcome {
    fn new(request: RenameRequest, dry_run: bool) -> Self {
        Self {
            request,
            status: RenameStatus::Completed,
            dry_run,
            documents: Vec::new(),
            relocation: RelocationOutcome::NotAttempted,
            abort_reason: None,
        }
    }

    fn abort(mut self, error: RenameError) -> Self {
        self.status = RenameStatus::Aborted;
        self.abort_reason = Some(error);
        self
    }

    fn finish(mut self) -> Self {
        if self.abort_reason.is_none() {
            self.status = if self.failures().next().is_some() {
                RenameStatus::PartiallyCompleted
            } else {
                RenameStatus::Completed
            };
        }
        self
    }

    /// Documents that could not be fetched or written.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &RenameError)> {
        self.documents.iter().filter_map(|doc| match &doc.outcome {
            DocumentOutcome::Failed { error } => Some((doc.path.as_str(), error)),
            _ => None,
        })
    }

    /// Links that may need fixing by hand.
    pub fn unresolved_matches(&self) -> impl Iterator<Item = &UnresolvedMatch> {
        self.documents.iter().flat_map(|doc| doc.unresolved.iter())
    }

    pub fn rewritten_documents(&self) -> impl Iterator<Item = &DocumentUpdate> {
        self.documents
            .iter()
            .filter(|doc| matches!(doc.outcome, DocumentOutcome::Rewritten { .. }))
    }

    pub fn links_rewritten(&self) -> usize {
        self.documents
            .iter()
            .map(|doc| match doc.outcome {
                DocumentOutcome::Rewritten { links_rewritten } => links_rewritten,
                _ => 0,
            })
            .sum()
    }

    /// Set when the note now exists at both its old and new path.
    pub fn duplicate_document(&self) -> Option<&RenameError> {
        self.abort_reason
            .as_ref()
            .filter(|error| error.is_duplicate_document())
    }
}

/// A link found by `Renamer::find_references`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoundLink {
    pub span: Range<usize>,
    pub text: String,
}

/// References to a note within one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceReport {
    pub path: String,
    pub links: Vec<FoundLink>,
    pub error: Option<RenameError>,
}

/// Renames a note and rewrites every link to it across the vault.
///
/// There is no transaction. Referencing documents are rewritten one by one
/// (failures are recorded, not fatal), then the note itself is copied to its new
/// path and the old copy deleted. A failed delete is compensated by removing the
/// new copy.
pub struct Renamer<S> {
    store: S,
    options: RenameOptions,
}

impl<S: DocumentStore> Renamer<S> {
    pub fn new(store: S, options: RenameOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &RenameOptions {
        &self.options
    }

    /// Rename `old` to `new` and propagate the change to every referencing document.
    ///
    /// Never fails as a whole: the returned outcome says what changed and what did not.
    pub async fn rename_and_propagate(
        &self,
        old: NoteIdentity,
        new: NoteIdentity,
    ) -> RenameOutcome {
        let request = RenameRequest { old, new };
        let mut outcome = RenameOutcome::new(request.clone(), self.options.dry_run);
        tracing::info!(
            "Renaming {} -> {}{}",
            request.old,
            request.new,
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        if let Err(error) = self.preflight(&request).await {
            tracing::error!("Rename aborted before any change: {}", error);
            return outcome.abort(error);
        }

        let candidates = match self.discover(&request.old).await {
            Ok(candidates) => candidates,
            Err(error) => {
                tracing::error!("Rename aborted: {}", error);
                return outcome.abort(error);
            }
        };
        tracing::info!(
            "Found {} candidate document(s) referencing {}",
            candidates.len(),
            request.old
        );

        outcome.documents = self.rewrite_documents(&request, &candidates).await;

        if self.options.dry_run {
            outcome.relocation = RelocationOutcome::Skipped;
            return outcome.finish();
        }

        match self.relocate(&request).await {
            Ok(relocation) => {
                outcome.relocation = relocation;
                outcome.finish()
            }
            Err(error) => {
                if error.is_duplicate_document() {
                    tracing::error!(
                        "{} now exists at both paths, resolve manually: {}",
                        request.old,
                        error
                    );
                } else {
                    tracing::error!("Relocation failed: {}", error);
                }
                outcome.relocation = RelocationOutcome::Failed {
                    error: error.clone(),
                };
                outcome.abort(error)
            }
        }
    }

    /// List the links to `note` in every document discovery reports.
    ///
    /// Documents without a matching link are left out.
    pub async fn find_references(
        &self,
        note: &NoteIdentity,
    ) -> Result<Vec<ReferenceReport>, RenameError> {
        let candidates = self.discover(note).await?;

        let mut reports: Vec<(usize, ReferenceReport)> = stream::iter(candidates.iter().enumerate())
            .map(|(idx, candidate)| async move {
                let path = candidate.path.as_str();
                let report = match self.fetch_document(path).await {
                    Ok(content) => ReferenceReport {
                        path: path.to_string(),
                        links: find_references(tokenize(&content), note)
                            .map(|token| FoundLink {
                                text: token.text(&content).to_string(),
                                span: token.span,
                            })
                            .collect(),
                        error: None,
                    },
                    Err(error) => ReferenceReport {
                        path: path.to_string(),
                        links: Vec::new(),
                        error: Some(error),
                    },
                };
                (idx, report)
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        reports.sort_by_key(|(idx, _)| *idx);
        Ok(reports
            .into_iter()
            .map(|(_, report)| report)
            .filter(|report| !report.links.is_empty() || report.error.is_some())
            .collect())
    }

    /// Run a store call under the configured timeout.
    async fn call<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let timeout = self.options.timeout;
        tokio::time::timeout(timeout, op)
            .await
            .unwrap_or(Err(StoreError::Timeout { timeout }))
    }

    async fn preflight(&self, request: &RenameRequest) -> Result<(), RenameError> {
        let old_path = request.old.document_path();
        let new_path = request.new.document_path();
        if old_path == new_path {
            return Err(RenameError::SamePath { path: old_path });
        }

        match self.call(self.store.fetch_content(&old_path)).await {
            Ok(Some(_)) => {}
            Ok(None) => return Err(RenameError::TargetNotFound { path: old_path }),
            Err(source) => {
                return Err(RenameError::RelocationFetchFailed {
                    path: old_path,
                    source,
                })
            }
        }

        match self.call(self.store.fetch_content(&new_path)).await {
            Ok(None) => Ok(()),
            Ok(Some(_)) => Err(RenameError::DestinationExists { path: new_path }),
            Err(source) => Err(RenameError::RelocationFetchFailed {
                path: new_path,
                source,
            }),
        }
    }

    async fn discover(&self, note: &NoteIdentity) -> Result<Vec<DocumentDescriptor>, RenameError> {
        let descriptors = self
            .call(self.store.find_referencing_documents(note.normalized_base()))
            .await
            .map_err(|source| RenameError::DiscoveryFailed { source })?;

        let mut seen = HashSet::new();
        Ok(descriptors
            .into_iter()
            .filter(|descriptor| seen.insert(descriptor.path.clone()))
            .collect())
    }

    async fn fetch_document(&self, path: &str) -> Result<String, RenameError> {
        match self.call(self.store.fetch_content(path)).await {
            Ok(Some(content)) => Ok(content),
            Ok(None) => Err(RenameError::DocumentFetchFailed {
                path: path.to_string(),
                source: StoreError::NotFound {
                    path: path.to_string(),
                },
            }),
            Err(source) => Err(RenameError::DocumentFetchFailed {
                path: path.to_string(),
                source,
            }),
        }
    }

    /// Process every candidate, at most `concurrency` at a time. Results come back
    /// in candidate order regardless of completion order.
    async fn rewrite_documents(
        &self,
        request: &RenameRequest,
        candidates: &[DocumentDescriptor],
    ) -> Vec<DocumentUpdate> {
        let mut updates: Vec<(usize, DocumentUpdate)> = stream::iter(candidates.iter().enumerate())
            .map(|(idx, candidate)| async move {
                (idx, self.rewrite_document(request, &candidate.path).await)
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        updates.sort_by_key(|(idx, _)| *idx);
        updates.into_iter().map(|(_, update)| update).collect()
    }

    async fn rewrite_document(&self, request: &RenameRequest, path: &str) -> DocumentUpdate {
        let original = match self.fetch_document(path).await {
            Ok(content) => content,
            Err(error) => {
                tracing::warn!("Skipping {}: {}", path, error);
                return DocumentUpdate::failed(path, None, error);
            }
        };

        let plan = compute_rename_edits(&original, &request.old, &request.new);
        let unresolved: Vec<UnresolvedMatch> = plan
            .unresolved
            .iter()
            .map(|token| UnresolvedMatch {
                document_path: path.to_string(),
                span: token.span.clone(),
                link: token.text(&original).to_string(),
            })
            .collect();
        for m in &unresolved {
            tracing::warn!(
                "{}: link {} references {} but has no rewritable shape, left as is",
                path,
                m.link,
                request.old
            );
        }

        if plan.matched == 0 {
            tracing::debug!("{}: no links to {}", path, request.old);
            return DocumentUpdate {
                path: path.to_string(),
                original_content: Some(original),
                new_content: None,
                outcome: DocumentOutcome::Unaffected,
                unresolved,
            };
        }

        let new_content = apply_edits(&original, &plan.edits);
        if plan.edits.is_empty() {
            return DocumentUpdate {
                path: path.to_string(),
                original_content: Some(original),
                new_content: Some(new_content),
                outcome: DocumentOutcome::Unchanged,
                unresolved,
            };
        }

        if !self.options.dry_run {
            if let Err(source) = self.call(self.store.write_content(path, &new_content)).await {
                let error = RenameError::DocumentWriteFailed {
                    path: path.to_string(),
                    source,
                };
                tracing::error!("{}", error);
                return DocumentUpdate {
                    new_content: Some(new_content),
                    unresolved,
                    ..DocumentUpdate::failed(path, Some(original), error)
                };
            }
        }

        tracing::info!(
            "Updated {} wikilink(s) in {} ({} -> {})",
            plan.edits.len(),
            path,
            request.old,
            request.new
        );
        DocumentUpdate {
            path: path.to_string(),
            original_content: Some(original),
            new_content: Some(new_content),
            outcome: DocumentOutcome::Rewritten {
                links_rewritten: plan.edits.len(),
            },
            unresolved,
        }
    }

    /// Copy the note to its new path, then delete the old one.
    async fn relocate(&self, request: &RenameRequest) -> Result<RelocationOutcome, RenameError> {
        let old_path = request.old.document_path();
        let new_path = request.new.document_path();

        let content = match self.call(self.store.fetch_content(&old_path)).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                return Err(RenameError::RelocationFetchFailed {
                    source: StoreError::NotFound {
                        path: old_path.clone(),
                    },
                    path: old_path,
                })
            }
            Err(source) => {
                return Err(RenameError::RelocationFetchFailed {
                    path: old_path,
                    source,
                })
            }
        };

        if let Err(source) = self.call(self.store.write_content(&new_path, &content)).await {
            return Err(RenameError::RelocationWriteFailed {
                path: new_path,
                source,
            });
        }
        tracing::info!("Copied {} -> {}", old_path, new_path);

        if let Err(source) = self.call(self.store.delete_document(&old_path)).await {
            tracing::warn!(
                "Failed to delete {} ({}), removing the new copy at {}",
                old_path,
                source,
                new_path
            );
            let compensation_error = self
                .call(self.store.delete_document(&new_path))
                .await
                .err();
            return Err(RenameError::RelocationDeleteFailed {
                old_path,
                new_path,
                source,
                compensation_error,
            });
        }
        tracing::info!("Deleted {}", old_path);

        Ok(RelocationOutcome::Relocated {
            from: old_path,
            to: new_path,
        })
    }
}
