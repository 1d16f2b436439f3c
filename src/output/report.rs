//! Markdown report generation
//!
//! This module renders submission and lookup results as human-readable
//! markdown, for display in the UI or for writing to a file.

use crate::outcome::{LookupReport, SubmissionReport};
use crate::output::{OutputError, OutputResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown report to a file
///
/// # Arguments
///
/// * `report` - The submission results
/// * `lookup` - Optional snapshot lookup results
/// * `screenshot` - Optional path of a screenshot taken by the UI
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to write the report
pub fn write_markdown_report(
    report: &SubmissionReport,
    lookup: Option<&LookupReport>,
    screenshot: Option<&Path>,
    output_path: &Path,
) -> OutputResult<()> {
    if output_path.is_dir() {
        return Err(OutputError::Write(format!(
            "{} is a directory",
            output_path.display()
        )));
    }
    let markdown = format_markdown_report(report, lookup, screenshot);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Serializes a submission report as pretty-printed JSON
pub fn format_json_report(report: &SubmissionReport) -> OutputResult<String> {
    serde_json::to_string_pretty(report).map_err(|e| OutputError::Format(e.to_string()))
}

/// Formats submission (and optionally lookup) results as markdown
///
/// # Returns
///
/// A formatted markdown string
pub fn format_markdown_report(
    report: &SubmissionReport,
    lookup: Option<&LookupReport>,
    screenshot: Option<&Path>,
) -> String {
    let mut md = String::new();

    // Title
    md.push_str("# Archive Submission Report\n\n");

    md.push_str("## Target\n\n");
    md.push_str(&format!("- **URL**: {}\n", report.target));
    md.push_str(&format!(
        "- **Completed**: {}\n",
        report.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format!(
        "- **Succeeded**: {} of {} service(s)\n\n",
        report.success_count(),
        report.results.len()
    ));

    // Per-service results
    md.push_str("## Results\n\n");
    md.push_str("| Service | Outcome | Attempts | Time | Archive |\n");
    md.push_str("|---------|---------|----------|------|---------|\n");
    for result in report.results.values() {
        md.push_str(&format!(
            "| {} | {} | {} | {:.1}s | {} |\n",
            cell(&result.service),
            result.outcome,
            result.attempts,
            result.elapsed.as_secs_f64(),
            result.archive_url.as_deref().map(cell).unwrap_or_else(|| "-".to_string())
        ));
    }
    md.push('\n');

    // Diagnostics, failures first
    let failures: Vec<_> = report.results.values().filter(|r| !r.is_success()).collect();
    if !failures.is_empty() {
        md.push_str("## Problems\n\n");
        for result in failures {
            md.push_str(&format!("- **{}**: {}\n", result.service, result.message));
        }
        md.push('\n');
    }

    let successes: Vec<_> = report.results.values().filter(|r| r.is_success()).collect();
    if !successes.is_empty() {
        md.push_str("## Details\n\n");
        for result in successes {
            md.push_str(&format!("- **{}**: {}\n", result.service, result.message));
        }
        md.push('\n');
    }

    if let Some(lookup) = lookup {
        md.push_str("## Historical Snapshots\n\n");
        for result in lookup.results.values() {
            md.push_str(&format!("### {}\n\n", result.service));
            md.push_str(&format!("{}\n\n", result.summary()));
            for source in &result.sources {
                if source.snapshots.is_empty() {
                    md.push_str(&format!("- {}: {}\n", source.source, source.message));
                }
                for snapshot in &source.snapshots {
                    md.push_str(&format!("- {}: <{}>\n", source.source, snapshot));
                }
            }
            md.push('\n');
        }
    }

    if let Some(screenshot) = screenshot {
        md.push_str("## Screenshot\n\n");
        md.push_str(&format!("![Screenshot]({})\n\n", screenshot.display()));
    }

    md
}

/// Escapes text for use inside a table cell
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
