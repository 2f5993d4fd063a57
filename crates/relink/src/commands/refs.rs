use anyhow::Result;
use relink_core::rename::ReferenceReport;
use relink_core::{DocumentStore, NoteIdentity, Renamer};
use std::fmt::Write as _;
use std::io::Write;

/// Execute `relink refs`: list every link to a note, grouped by document.
pub async fn run<S: DocumentStore>(
    renamer: &Renamer<S>,
    note: &str,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let note = NoteIdentity::new(note);
    let reports = renamer.find_references(&note).await?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&reports)?)?;
    } else {
        write!(out, "{}", render(&note, &reports))?;
    }
    Ok(())
}

pub fn render(note: &NoteIdentity, reports: &[ReferenceReport]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Backlinks to {}:", note);
    if reports.is_empty() {
        output.push_str("- (none)\n");
        return output;
    }

    for report in reports {
        match &report.error {
            Some(error) => {
                let _ = writeln!(output, "- {} (unreadable: {})", report.path, error);
            }
            None => {
                let _ = writeln!(output, "- {}", report.path);
                for link in &report.links {
                    let _ = writeln!(
                        output,
                        "    {}..{}  {}",
                        link.span.start, link.span.end, link.text
                    );
                }
            }
        }
    }
    output
}
