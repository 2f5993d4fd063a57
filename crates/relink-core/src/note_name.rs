use crate::link_parser::LinkToken;
use serde::{Deserialize, Serialize};
use std::fmt;

const MARKDOWN_EXT: &str = ".md";

/// A note name as the user typed it, e.g. `Projects/Popular Note.md`.
///
/// Everything else is derived on demand: `normalized_base()` drops a trailing
/// `.md` and any leading `/`, `filename()` is the last segment of that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteIdentity(String);

impl NoteIdentity {
    pub fn new(raw: impl Into<String>) -> Self {
        NoteIdentity(raw.into())
    }

    /// The name exactly as authored.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Projects/Popular Note.md` -> `Projects/Popular Note`
    pub fn normalized_base(&self) -> &str {
        normalize_note_name(&self.0)
    }

    /// `Projects/Popular Note.md` -> `Popular Note`
    pub fn filename(&self) -> &str {
        let base = self.normalized_base();
        base.rsplit('/').next().unwrap_or(base)
    }

    /// Vault-relative path of the document backing this note.
    pub fn document_path(&self) -> String {
        format!("{}{}", self.normalized_base(), MARKDOWN_EXT)
    }
}

impl fmt::Display for NoteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteIdentity {
    fn from(raw: &str) -> Self {
        NoteIdentity::new(raw)
    }
}

impl From<String> for NoteIdentity {
    fn from(raw: String) -> Self {
        NoteIdentity(raw)
    }
}

/// Strip one trailing `.md`, then every leading `/`.
pub fn normalize_note_name(name: &str) -> &str {
    name.strip_suffix(MARKDOWN_EXT)
        .unwrap_or(name)
        .trim_start_matches('/')
}

/// `[[## query]]` and `[[^^ query]]` embed a search, they do not name a note.
pub fn is_search_helper(token: &LinkToken) -> bool {
    token.target_raw.starts_with("## ") || token.target_raw.starts_with("^^ ")
}

/// `[[#Heading]]` points inside the current document.
pub fn is_internal_anchor(token: &LinkToken) -> bool {
    token.target_raw.starts_with('#')
}

/// Does `token` reference `target`?
///
/// Both sides are normalized, then compared by exact match or by either one
/// being a `/`-aligned suffix of the other. This is a heuristic: with two notes
/// named `Notes` in different folders, a bare `[[Notes]]` matches both.
pub fn refers_to(token: &LinkToken, target: &NoteIdentity) -> bool {
    if is_search_helper(token) || is_internal_anchor(token) {
        return false;
    }

    let link_base = normalize_note_name(token.note_part.trim());
    if link_base.is_empty() {
        return false;
    }
    let target_base = target.normalized_base();

    link_base == target_base
        || ends_with_segment(link_base, target_base)
        || ends_with_segment(target_base, link_base)
}

/// Keep only the tokens that reference `target`, in their original order.
pub fn find_references<'a, I>(
    tokens: I,
    target: &'a NoteIdentity,
) -> impl Iterator<Item = LinkToken> + 'a
where
    I: IntoIterator<Item = LinkToken>,
    I::IntoIter: 'a,
{
    tokens
        .into_iter()
        .filter(move |token| refers_to(token, target))
}

/// True when `path` ends with `"/" + suffix`.
fn ends_with_segment(path: &str, suffix: &str) -> bool {
    !suffix.is_empty()
        && path.len() > suffix.len()
        && path.ends_with(suffix)
        && path.as_bytes()[path.len() - suffix.len() - 1] == b'/'
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link_parser::tokenize;

    fn matches(text: &str, target: &str) -> Vec<String> {
        let target = NoteIdentity::new(target);
        find_references(tokenize(text), &target)
            .map(|t| t.text(text).to_string())
            .collect()
    }

    // === NoteIdentity ===

    #[test]
    fn identity_derives_base_and_filename() {
        let id = NoteIdentity::new("Projects/Popular Note.md");
        assert_eq!(id.as_str(), "Projects/Popular Note.md");
        assert_eq!(id.normalized_base(), "Projects/Popular Note");
        assert_eq!(id.filename(), "Popular Note");
        assert_eq!(id.document_path(), "Projects/Popular Note.md");
    }

    #[test]
    fn identity_strips_leading_slash() {
        let id = NoteIdentity::new("/Projects/Note");
        assert_eq!(id.normalized_base(), "Projects/Note");
        assert_eq!(id.document_path(), "Projects/Note.md");
    }

    #[test]
    fn identity_without_folder() {
        let id = NoteIdentity::new("Popular Note");
        assert_eq!(id.filename(), "Popular Note");
        assert_eq!(id.document_path(), "Popular Note.md");
    }

    #[test]
    fn only_one_md_suffix_is_stripped() {
        assert_eq!(normalize_note_name("notes.md.md"), "notes.md");
        assert_eq!(normalize_note_name("//a/b.md"), "a/b");
    }

    // === exclusions ===

    #[test]
    fn search_helpers_never_match() {
        assert!(matches("[[## Popular Note]]", "Popular Note").is_empty());
        assert!(matches("[[^^ Popular Note]]", "Popular Note").is_empty());
    }

    #[test]
    fn internal_anchors_never_match() {
        assert!(matches("[[#Popular Note]]", "Popular Note").is_empty());
        assert!(matches("[[#]]", "Popular Note").is_empty());
    }

    #[test]
    fn empty_note_part_never_matches() {
        assert!(matches("[[|alias]]", "Popular Note").is_empty());
        assert!(matches("[[ .md]]", "Popular Note").is_empty());
    }

    // === equivalence ===

    #[test]
    fn exact_match() {
        assert_eq!(matches("[[Popular Note]]", "Popular Note"), vec!["[[Popular Note]]"]);
    }

    #[test]
    fn extension_and_leading_slash_are_ignored() {
        let text = "[[Popular Note.md]] [[/Popular Note]] [[/Popular Note.md]]";
        assert_eq!(matches(text, "Popular Note.md").len(), 3);
    }

    #[test]
    fn longer_link_path_matches_shorter_target() {
        assert_eq!(
            matches("[[Projects/Popular Note#Sec]]", "Popular Note"),
            vec!["[[Projects/Popular Note#Sec]]"]
        );
    }

    #[test]
    fn shorter_link_matches_longer_target() {
        assert_eq!(matches("[[Notes]]", "Projects/Notes").len(), 1);
        assert_eq!(matches("[[B/C]]", "A/B/C").len(), 1);
    }

    #[test]
    fn suffix_must_align_on_segment_boundary() {
        assert!(matches("[[Other Notes]]", "Notes").is_empty());
        assert!(matches("[[Notes]]", "ProjectsNotes").is_empty());
    }

    #[test]
    fn different_folder_same_suffix_does_not_match() {
        assert!(matches("[[Archive/Notes]]", "Projects/Notes").is_empty());
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(matches("[[popular note]]", "Popular Note").is_empty());
    }

    #[test]
    fn surrounding_whitespace_is_ignored_for_matching() {
        assert_eq!(matches("[[ Popular Note |x]]", "Popular Note").len(), 1);
    }

    #[test]
    fn order_is_preserved_and_non_matches_dropped() {
        let text = "[[B]] [[A]] [[x/A#h]] [[C]] ![[A.md]]";
        assert_eq!(matches(text, "A"), vec!["[[A]]", "[[x/A#h]]", "![[A.md]]"]);
    }
}
