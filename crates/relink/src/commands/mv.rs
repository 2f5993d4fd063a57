use anyhow::Result;
use colored::Colorize;
use relink_core::{
    DocumentOutcome, DocumentStore, DocumentUpdate, RelocationOutcome, RenameOutcome,
    RenameStatus, Renamer,
};
use similar::TextDiff;
use std::fmt::Write as _;
use std::io::Write;

/// Execute `relink mv`: rename a note and rewrite every link to it.
pub async fn run<S: DocumentStore>(
    renamer: &Renamer<S>,
    old: &str,
    new: &str,
    json: bool,
    out: &mut impl Write,
) -> Result<RenameStatus> {
    let outcome = renamer
        .rename_and_propagate(old.into(), new.into())
        .await;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&outcome)?)?;
    } else {
        write!(out, "{}", render(&outcome))?;
    }
    Ok(outcome.status)
}

pub fn exit_code(status: RenameStatus) -> u8 {
    match status {
        RenameStatus::Completed => 0,
        RenameStatus::Aborted => 1,
        RenameStatus::PartiallyCompleted => 2,
    }
}

/// Human-readable report: one line per document, then relocation and a summary.
pub fn render(outcome: &RenameOutcome) -> String {
    let mut output = String::new();
    let request = &outcome.request;

    let title = if outcome.dry_run { "Dry run:" } else { "Rename:" };
    let _ = writeln!(output, "{} {} -> {}", title.bold(), request.old, request.new);

    if !outcome.documents.is_empty() {
        output.push_str("\nDocuments:\n");
        for doc in &outcome.documents {
            render_document(&mut output, doc);
            if outcome.dry_run {
                if let Some(diff) = render_diff(doc) {
                    output.push_str(&diff);
                }
            }
        }
    }

    let unresolved: Vec<_> = outcome.unresolved_matches().collect();
    if !unresolved.is_empty() {
        output.push_str("\nUnresolved links (left as written, fix by hand):\n");
        for m in unresolved {
            let _ = writeln!(
                output,
                "- {} at {}..{}: {}",
                m.document_path, m.span.start, m.span.end, m.link
            );
        }
    }

    output.push('\n');
    match &outcome.relocation {
        RelocationOutcome::Relocated { from, to } => {
            let _ = writeln!(output, "Moved {} -> {}", from, to);
        }
        RelocationOutcome::Skipped => output.push_str("Move skipped (dry run)\n"),
        RelocationOutcome::NotAttempted => output.push_str("Move not attempted\n"),
        RelocationOutcome::Failed { error } => {
            let _ = writeln!(output, "{} {}", "Move failed:".red(), error);
        }
    }

    if let Some(error) = outcome.duplicate_document() {
        let _ = writeln!(
            output,
            "{} the note now exists at both paths, resolve manually ({})",
            "WARNING:".red().bold(),
            error
        );
    } else if let Some(reason) = &outcome.abort_reason {
        let _ = writeln!(output, "{} {}", "Aborted:".red().bold(), reason);
    }

    let failures = outcome.failures().count();
    let status = match outcome.status {
        RenameStatus::Completed => "completed".green(),
        RenameStatus::PartiallyCompleted => "partially completed".yellow(),
        RenameStatus::Aborted => "aborted".red(),
    };
    let _ = writeln!(
        output,
        "{} link(s) rewritten in {} document(s), {} failure(s): {}",
        outcome.links_rewritten(),
        outcome.rewritten_documents().count(),
        failures,
        status
    );
    output
}

fn render_document(output: &mut String, doc: &DocumentUpdate) {
    let _ = match &doc.outcome {
        DocumentOutcome::Rewritten { links_rewritten } => writeln!(
            output,
            "  {} {} ({} link(s))",
            "rewritten".green(),
            doc.path,
            links_rewritten
        ),
        DocumentOutcome::Unchanged => writeln!(output, "  {} {}", "unchanged".yellow(), doc.path),
        DocumentOutcome::Unaffected => {
            writeln!(output, "  {} {}", "no links ".dimmed(), doc.path)
        }
        DocumentOutcome::Failed { error } => {
            writeln!(output, "  {} {}: {}", "FAILED   ".red(), doc.path, error)
        }
    };
}

/// Unified diff of a document's planned change, if it has one.
fn render_diff(doc: &DocumentUpdate) -> Option<String> {
    let original = doc.original_content.as_deref()?;
    let new_content = doc.new_content.as_deref()?;
    if original == new_content {
        return None;
    }
    let diff = TextDiff::from_lines(original, new_content);
    let rendered = diff
        .unified_diff()
        .context_radius(1)
        .header(&format!("a/{}", doc.path), &format!("b/{}", doc.path))
        .to_string();
    Some(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relink_core::{MemoryStore, RenameOptions};

    fn plain() {
        colored::control::set_override(false);
    }

    async fn mv(store: MemoryStore, dry_run: bool, old: &str, new: &str) -> (RenameStatus, String) {
        plain();
        let renamer = Renamer::new(
            store,
            RenameOptions {
                dry_run,
                ..RenameOptions::default()
            },
        );
        let mut out = Vec::new();
        let status = run(&renamer, old, new, false, &mut out).await.unwrap();
        (status, String::from_utf8(out).unwrap())
    }

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(RenameStatus::Completed), 0);
        assert_eq!(exit_code(RenameStatus::Aborted), 1);
        assert_eq!(exit_code(RenameStatus::PartiallyCompleted), 2);
    }

    #[tokio::test]
    async fn reports_rewrites_and_move() {
        let (status, text) = mv(
            MemoryStore::with_documents([
                ("Note.md", "body"),
                ("A.md", "[[Note]] and [[Note#h|x]]"),
                ("B.md", "Note, [[Other]]"),
            ]),
            false,
            "Note",
            "Topic",
        )
        .await;

        assert_eq!(status, RenameStatus::Completed);
        assert!(text.starts_with("Rename: Note -> Topic\n"));
        assert!(text.contains("  rewritten A.md (2 link(s))\n"));
        assert!(text.contains("  no links  B.md\n"));
        assert!(text.contains("Moved Note.md -> Topic.md\n"));
        assert!(text.ends_with("2 link(s) rewritten in 1 document(s), 0 failure(s): completed\n"));
    }

    #[tokio::test]
    async fn dry_run_prints_diff() {
        let (status, text) = mv(
            MemoryStore::with_documents([("Note.md", "body"), ("A.md", "one\nsee [[Note]]\nthree\n")]),
            true,
            "Note",
            "Topic",
        )
        .await;

        assert_eq!(status, RenameStatus::Completed);
        assert!(text.contains("--- a/A.md\n+++ b/A.md\n"));
        assert!(text.contains("-see [[Note]]\n+see [[Topic]]\n"));
        assert!(text.contains("Move skipped (dry run)\n"));
    }

    #[tokio::test]
    async fn reports_failures_and_unresolved() {
        let store = MemoryStore::with_documents([
            ("A/B/C.md", "target"),
            ("Odd.md", "[[/B/C]]"),
            ("Bad.md", "[[C]]"),
        ]);
        store.fail_writes_to("Bad.md");
        let (status, text) = mv(store, false, "A/B/C", "A/B/D").await;

        assert_eq!(status, RenameStatus::PartiallyCompleted);
        assert!(text.contains("  FAILED    Bad.md: "));
        assert!(text.contains("  unchanged Odd.md\n"));
        assert!(text.contains("- Odd.md at 0..8: [[/B/C]]\n"));
        assert!(text.contains("partially completed"));
    }

    #[tokio::test]
    async fn aborted_run_explains_why() {
        let (status, text) = mv(MemoryStore::new(), false, "Missing", "Other").await;
        assert_eq!(status, RenameStatus::Aborted);
        assert!(text.contains("Move not attempted\n"));
        assert!(text.contains("Aborted: "));
        assert!(text.contains("Missing.md"));
    }

    #[tokio::test]
    async fn duplicate_document_is_a_warning() {
        let store = MemoryStore::with_documents([("Note.md", "body")]);
        store.fail_deletes_of("Note.md");
        store.fail_deletes_of("Topic.md");
        let (_, text) = mv(store, false, "Note", "Topic").await;
        assert!(text.contains("WARNING: the note now exists at both paths"));
    }

    #[tokio::test]
    async fn json_output_is_the_outcome() {
        let renamer = Renamer::new(
            MemoryStore::with_documents([("Note.md", "body"), ("A.md", "[[Note]]")]),
            RenameOptions::default(),
        );
        let mut out = Vec::new();
        run(&renamer, "Note", "Topic", true, &mut out).await.unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["status"], "Completed");
        assert_eq!(value["request"]["old"], "Note");
        assert_eq!(value["documents"][0]["path"], "A.md");
        assert_eq!(value["documents"][0]["outcome"]["kind"], "rewritten");
        assert_eq!(value["relocation"]["to"], "Topic.md");
    }
}
