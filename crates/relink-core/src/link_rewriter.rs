use crate::link_parser::{tokenize, LinkToken};
use crate::note_name::{find_references, NoteIdentity};
use serde::Serialize;

/// Which spelling of the old name a link used, and so how it was rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteRule {
    /// `[[Projects/Old]]`
    FullPath,
    /// `[[Projects/Old.md]]`
    FullPathWithExtension,
    /// `[[Old]]`
    Filename,
    /// `[[Old.md]]`
    FilenameWithExtension,
    /// `[[/Projects/Old]]` or `[[/Projects/Old.md]]`
    AbsolutePath,
    /// `[[Some/Path/Old]]`, only the last segment is replaced
    LastSegment,
    /// Matched as a reference but spelled in no shape we know how to rewrite.
    Unresolved,
}

/// Replacement text for one link span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub text: String,
    pub rule: RewriteRule,
}

impl Rewrite {
    pub fn is_resolved(&self) -> bool {
        self.rule != RewriteRule::Unresolved
    }
}

/// Rebuild `token` so that it names `new` instead of `old`.
///
/// Only the note-part changes. The embed `!`, anchor, alias and any whitespace
/// around the note-part are copied verbatim. When the note-part fits none of the
/// known spellings it is kept as is and the rule is `Unresolved`.
pub fn rewrite(token: &LinkToken, old: &NoteIdentity, new: &NoteIdentity) -> Rewrite {
    let note = token.note_part.as_str();
    let lead_len = note.len() - note.trim_start().len();
    let trail_start = note.trim_end().len().max(lead_len);
    let (lead, core, trail) = (
        &note[..lead_len],
        &note[lead_len..trail_start],
        &note[trail_start..],
    );

    let (new_core, rule) = match rewrite_note_part(core, old, new) {
        Some(rewritten) => rewritten,
        None => (core.to_string(), RewriteRule::Unresolved),
    };

    let mut text = String::with_capacity(token.span.len() + new_core.len());
    if token.is_embed {
        text.push('!');
    }
    text.push_str("[[");
    text.push_str(lead);
    text.push_str(&new_core);
    text.push_str(trail);
    if let Some(anchor) = &token.anchor {
        text.push_str(anchor);
    }
    if let Some(alias) = &token.alias {
        text.push('|');
        text.push_str(alias);
    }
    text.push_str("]]");

    Rewrite { text, rule }
}

fn rewrite_note_part(
    note: &str,
    old: &NoteIdentity,
    new: &NoteIdentity,
) -> Option<(String, RewriteRule)> {
    let (old_base, new_base) = (old.normalized_base(), new.normalized_base());
    let (old_file, new_file) = (old.filename(), new.filename());

    if note == old_base {
        return Some((new_base.to_string(), RewriteRule::FullPath));
    }
    if note.strip_suffix(".md") == Some(old_base) {
        return Some((format!("{new_base}.md"), RewriteRule::FullPathWithExtension));
    }
    if note == old_file {
        return Some((new_file.to_string(), RewriteRule::Filename));
    }
    if note.strip_suffix(".md") == Some(old_file) {
        return Some((format!("{new_file}.md"), RewriteRule::FilenameWithExtension));
    }

    if let Some(rest) = note.strip_prefix('/') {
        if rest == old_base {
            return Some((format!("/{new_base}"), RewriteRule::AbsolutePath));
        }
        if rest.strip_suffix(".md") == Some(old_base) {
            return Some((format!("/{new_base}.md"), RewriteRule::AbsolutePath));
        }
    } else if let Some((dir, last)) = note.rsplit_once('/') {
        if last == old_file {
            return Some((format!("{dir}/{new_file}"), RewriteRule::LastSegment));
        }
        if last.strip_suffix(".md") == Some(old_file) {
            return Some((format!("{dir}/{new_file}.md"), RewriteRule::LastSegment));
        }
    }

    // The name exactly as the caller authored it, in a spelling none of the
    // shapes above cover (e.g. `//Old`). Answer in the caller's spelling too.
    if note == old.as_str() {
        return Some((new.as_str().to_string(), RewriteRule::FullPath));
    }

    None
}

/// A text edit: replace `remove_len` bytes at `offset` with `insert_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    /// Byte offset in source
    pub offset: usize,
    /// Number of bytes to remove
    pub remove_len: usize,
    /// Replacement text
    pub insert_text: String,
}

/// Everything a rename means for one document's text.
#[derive(Debug, Default)]
pub struct RenameEdits {
    /// Edits in reverse offset order. Links whose text would not change get no edit.
    pub edits: Vec<TextEdit>,
    /// Links that reference the old note but could not be rewritten.
    pub unresolved: Vec<LinkToken>,
    /// Number of links that reference the old note.
    pub matched: usize,
}

/// Find every link to `old` in `markdown` and compute the edits that point them at `new`.
pub fn compute_rename_edits(
    markdown: &str,
    old: &NoteIdentity,
    new: &NoteIdentity,
) -> RenameEdits {
    let mut result = RenameEdits::default();

    for token in find_references(tokenize(markdown), old) {
        result.matched += 1;
        let rewrite = rewrite(&token, old, new);
        if !rewrite.is_resolved() {
            result.unresolved.push(token);
            continue;
        }
        if rewrite.text == token.text(markdown) {
            continue;
        }
        result.edits.push(TextEdit {
            offset: token.span.start,
            remove_len: token.span.len(),
            insert_text: rewrite.text,
        });
    }

    // Sort in reverse offset order for safe sequential application
    result.edits.sort_by(|a, b| b.offset.cmp(&a.offset));
    result
}

/// Apply edits (in reverse offset order, as `compute_rename_edits` returns them).
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> String {
    let mut out = text.to_string();
    for edit in edits {
        out.replace_range(edit.offset..edit.offset + edit.remove_len, &edit.insert_text);
    }
    out
}
