#[cfg(test)]
mod tests {
    use super::*;

    fn collect(text: &str) -> Vec<LinkToken> {
        tokenize(text).collect()
    }

    // === tokenize: shapes ===

    #[test]
    fn tokenizes_simple_wikilink() {
        let tokens = collect("[[Note]]");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].note_part, "Note");
        assert_eq!(tokens[0].target_raw, "Note");
        assert_eq!(tokens[0].alias, None);
        assert_eq!(tokens[0].anchor, None);
        assert!(!tokens[0].is_embed);
        assert_eq!(tokens[0].span, 0..8);
    }

    #[test]
    fn returns_empty_for_no_links() {
        assert!(collect("plain text, [single] brackets").is_empty());
    }

    #[test]
    fn splits_anchor_and_alias() {
        let tokens = collect("[[Popular Note#Introduction|Intro]]");
        assert_eq!(tokens.len(), 1);
        let t = &tokens[0];
        assert_eq!(t.target_raw, "Popular Note#Introduction");
        assert_eq!(t.note_part, "Popular Note");
        assert_eq!(t.anchor.as_deref(), Some("#Introduction"));
        assert_eq!(t.alias.as_deref(), Some("Intro"));
    }

    #[test]
    fn anchor_splits_on_first_hash_only() {
        let tokens = collect("[[Note#Heading#Sub]]");
        assert_eq!(tokens[0].note_part, "Note");
        assert_eq!(tokens[0].anchor.as_deref(), Some("#Heading#Sub"));
    }

    #[test]
    fn alias_splits_on_first_pipe_only() {
        let tokens = collect("[[Note|a|b]]");
        assert_eq!(tokens[0].target_raw, "Note");
        assert_eq!(tokens[0].alias.as_deref(), Some("a|b"));
    }

    #[test]
    fn hash_inside_alias_is_not_an_anchor() {
        let tokens = collect("[[Note|see #3]]");
        assert_eq!(tokens[0].note_part, "Note");
        assert_eq!(tokens[0].anchor, None);
        assert_eq!(tokens[0].alias.as_deref(), Some("see #3"));
    }

    #[test]
    fn block_reference_is_kept_as_anchor() {
        let tokens = collect("[[Note#^abc123]]");
        assert_eq!(tokens[0].anchor.as_deref(), Some("#^abc123"));
    }

    #[test]
    fn embed_prefix_is_part_of_span() {
        let text = "x ![[project/Popular Note.md]] y";
        let tokens = collect(text);
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_embed);
        assert_eq!(tokens[0].text(text), "![[project/Popular Note.md]]");
        assert_eq!(tokens[0].note_part, "project/Popular Note.md");
    }

    #[test]
    fn no_filtering_of_pseudo_links() {
        let tokens = collect("[[## query]] [[^^ query]] [[#Local]]");
        assert_eq!(tokens.len(), 3);
    }

    // === tokenize: spans and scanning ===

    #[test]
    fn multiple_tokens_in_order_with_spans() {
        let text = "[[A]] then ![[B]]";
        let tokens = collect(text);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].span, 0..5);
        assert_eq!(tokens[1].span, 11..17);
        assert_eq!(tokens[1].text(text), "![[B]]");
        assert!(tokens[0].span.end <= tokens[1].span.start);
    }

    #[test]
    fn first_closing_brackets_end_the_token() {
        let text = "[[a [[b]] c]]";
        let tokens = collect(text);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].target_raw, "a [[b");
        assert_eq!(tokens[0].span, 0..9);
    }

    #[test]
    fn single_bracket_inside_is_allowed() {
        let tokens = collect("[[a]b]]");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].target_raw, "a]b");
    }

    #[test]
    fn second_opening_is_absorbed_into_first_token() {
        let tokens = collect("[[Open and [[Closed]]");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].target_raw, "Open and [[Closed");
    }

    #[test]
    fn unterminated_link_yields_nothing() {
        assert!(collect("trailing [[never closed").is_empty());
        let tokens = collect("[[A]] then [[never closed ]");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].note_part, "A");
    }

    #[test]
    fn ignores_empty_brackets() {
        let tokens = collect("[[]] and [[Real]]");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].note_part, "Real");
    }

    #[test]
    fn handles_multibyte_chars_before_wikilink() {
        let text = "café ✓ [[Naïve Note]]";
        let tokens = collect(text);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text(text), "[[Naïve Note]]");
    }

    #[test]
    fn iterator_is_restartable() {
        let text = "[[A]] [[B]]";
        let iter = tokenize(text);
        let first: Vec<_> = iter.clone().collect();
        let second: Vec<_> = iter.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn links_may_span_lines() {
        let tokens = collect("[[Multi\nLine]]");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].note_part, "Multi\nLine");
    }
}

use serde::Serialize;
use std::ops::Range;

const OPEN: &[u8; 2] = b"[[";
const CLOSE: &[u8; 2] = b"]]";
const EMBED: u8 = b'!';

/// One `[[...]]` or `![[...]]` occurrence, decomposed.
///
/// `span` is the half-open byte range of the whole link in the scanned text,
/// including the embed `!`. The string fields are copies of the pieces, spelled
/// exactly as written (no trimming, no normalization).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkToken {
    pub is_embed: bool,
    pub span: Range<usize>,
    /// Inner text before the first `|`, e.g. `Note#Section` from `[[Note#Section|Alias]]`
    pub target_raw: String,
    /// `target_raw` before the first `#`, e.g. `Note`
    pub note_part: String,
    /// Text after the first `|`
    pub alias: Option<String>,
    /// Heading or block reference including the leading `#`, e.g. `#Section`
    pub anchor: Option<String>,
}

impl LinkToken {
    fn from_inner(inner: &str, span: Range<usize>, is_embed: bool) -> Self {
        let (target_raw, alias) = match inner.split_once('|') {
            Some((target, alias)) => (target, Some(alias.to_string())),
            None => (inner, None),
        };
        let (note_part, anchor) = match target_raw.find('#') {
            Some(idx) => (&target_raw[..idx], Some(target_raw[idx..].to_string())),
            None => (target_raw, None),
        };
        LinkToken {
            is_embed,
            span,
            target_raw: target_raw.to_string(),
            note_part: note_part.to_string(),
            alias,
            anchor,
        }
    }

    /// The original link text in `source` (the text this token was scanned from).
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.clone()]
    }
}

/// Lazily scan `text` for wikilinks, left to right.
///
/// An opening `[[` is closed by the first `]]` after it; nothing nests. An opening
/// with no closing `]]` anywhere after it produces no token, and neither does `[[]]`.
/// Clone the iterator (or call again) to rescan.
pub fn tokenize(text: &str) -> LinkTokens<'_> {
    LinkTokens { text, pos: 0 }
}

#[derive(Debug, Clone)]
pub struct LinkTokens<'a> {
    text: &'a str,
    pos: usize,
}

impl Iterator for LinkTokens<'_> {
    type Item = LinkToken;

    fn next(&mut self) -> Option<LinkToken> {
        let bytes = self.text.as_bytes();
        loop {
            let open = find_pair(bytes, self.pos, OPEN)?;
            let inner_start = open + OPEN.len();
            let Some(close) = find_pair(bytes, inner_start, CLOSE) else {
                self.pos = bytes.len();
                return None;
            };
            self.pos = close + CLOSE.len();

            if close == inner_start {
                continue;
            }

            // Brackets and `!` are ASCII, so every offset here is a char boundary.
            let is_embed = open > 0 && bytes[open - 1] == EMBED;
            let start = if is_embed { open - 1 } else { open };
            return Some(LinkToken::from_inner(
                &self.text[inner_start..close],
                start..self.pos,
                is_embed,
            ));
        }
    }
}

/// Byte offset of the next `pair` at or after `from`.
fn find_pair(bytes: &[u8], from: usize, pair: &[u8; 2]) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(2)
        .position(|w| w == pair)
        .map(|idx| from + idx)
}
