//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of a mirror run:
//! run metadata, stream counts, the most referenced missing URLs and the
//! error list.

use crate::output::traits::OutputResult;
use crate::output::MirrorSummary;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Number of not-found URLs shown in the summary table
const TOP_NOT_FOUND: usize = 20;

/// Generates a markdown summary file
///
/// # Arguments
///
/// * `summary` - The run summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &MirrorSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Escapes characters that would break a markdown table cell
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &MirrorSummary) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Mirror Run Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = summary.duration_seconds {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    md.push_str("## Report Streams\n\n");
    md.push_str("| Stream | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Completed | {} |\n", summary.completed));
    md.push_str(&format!("| Not Found (404) | {} |\n", summary.not_found));
    md.push_str(&format!("| Errors | {} |\n\n", summary.errors));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        summary.success_rate()
    ));

    if !summary.top_not_found.is_empty() {
        md.push_str(&format!("## Top {} Not Found URLs\n\n", TOP_NOT_FOUND));
        md.push_str("| URL | References | Linked From |\n");
        md.push_str("|-----|------------|-------------|\n");

        for entry in summary.top_not_found.iter().take(TOP_NOT_FOUND) {
            let referrers = if entry.referrers.is_empty() {
                "-".to_string()
            } else {
                entry
                    .referrers
                    .iter()
                    .map(|r| cell(r))
                    .collect::<Vec<_>>()
                    .join("<br>")
            };
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                cell(&entry.url),
                entry.count,
                referrers
            ));
        }
        if summary.top_not_found.len() > TOP_NOT_FOUND {
            md.push_str(&format!(
                "\n... and {} more\n",
                summary.top_not_found.len() - TOP_NOT_FOUND
            ));
        }
        md.push('\n');
    }

    if !summary.recent_errors.is_empty() {
        md.push_str("## Errors\n\n");
        md.push_str("| URL | Kind | Status | Message |\n");
        md.push_str("|-----|------|--------|---------|\n");

        for error in &summary.recent_errors {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                cell(&error.url),
                error.resource_kind.as_deref().unwrap_or("-"),
                error
                    .status_code
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                cell(error.message.as_deref().unwrap_or(""))
            ));
        }
        md.push('\n');
    }

    md
}
