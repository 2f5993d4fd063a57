//! Rename a note in a vault of wikilinked Markdown documents and keep every
//! link to it pointing at the right place.
//!
//! The pieces, leaf first: [`link_parser`] finds `[[...]]` links, [`note_name`]
//! decides which of them reference a note, [`link_rewriter`] rewrites them, and
//! [`rename`] drives the whole thing against a [`doc_store::DocumentStore`].

pub mod doc_store;
pub mod error;
pub mod link_parser;
pub mod link_rewriter;
pub mod note_name;
pub mod rename;
pub mod rest_store;

pub use doc_store::{DocumentDescriptor, DocumentStore, MemoryStore, StoreError};
pub use error::RenameError;
pub use link_parser::{tokenize, LinkToken};
pub use link_rewriter::{rewrite, Rewrite, RewriteRule};
pub use note_name::{find_references, NoteIdentity};
pub use rename::{
    DocumentOutcome, DocumentUpdate, RelocationOutcome, RenameOptions, RenameOutcome,
    RenameRequest, RenameStatus, Renamer, UnresolvedMatch,
};
pub use rest_store::{RestStore, RestStoreConfig};
