use std::fmt::Write as _;
use std::str::FromStr;

use serde::Deserialize;

use crate::errors::DiveInError;
use crate::models::HistoryEntry;

const TOP_FILES: usize = 10;

/// Rendering formats for a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Html,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Html => "html",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Html => "text/html",
        }
    }

    /// Name of the cached export for entry `id`.
    pub fn filename(&self, id: &str) -> String {
        format!("dive-export-{}.{}", id, self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = DiveInError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "html" => Ok(ExportFormat::Html),
            _ => Err(DiveInError::Validation(format!(
                "unsupported export format: {}",
                value
            ))),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered export ready to be cached or downloaded.
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub format: ExportFormat,
    pub filename: String,
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportPayload {
    #[serde(default)]
    image: ImageReport,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ImageReport {
    size_bytes: i64,
    inefficient_bytes: i64,
    efficiency_score: f64,
    file_reference: Vec<FileReference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FileReference {
    count: i64,
    size_bytes: i64,
    file: String,
}

/// Render `entry` in `format`.
pub fn generate(format: ExportFormat, entry: &HistoryEntry) -> Result<ExportedFile, DiveInError> {
    let data = match format {
        ExportFormat::Json => entry.result_bytes().to_vec(),
        ExportFormat::Csv => render_csv(&parse_payload(entry)?).into_bytes(),
        ExportFormat::Html => render_html(entry, &parse_payload(entry)?).into_bytes(),
    };

    Ok(ExportedFile {
        format,
        filename: format.filename(&entry.metadata.id),
        content_type: format.content_type(),
        data,
    })
}

fn parse_payload(entry: &HistoryEntry) -> Result<ExportPayload, DiveInError> {
    serde_json::from_str(entry.result.get())
        .map_err(|e| DiveInError::Internal(format!("failed to parse analysis result: {}", e)))
}

/// Largest files first; equal sizes keep report order.
fn top_files(files: &[FileReference], limit: usize) -> Vec<FileReference> {
    let mut ordered = files.to_vec();
    ordered.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
    ordered.truncate(limit);
    ordered
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn push_csv_row(out: &mut String, fields: &[&str]) {
    let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
    out.push_str(&row.join(","));
    out.push('\n');
}

fn render_csv(payload: &ExportPayload) -> String {
    let image = &payload.image;
    let mut out = String::new();

    push_csv_row(&mut out, &["category", "name", "sizeBytes", "count", "value"]);
    push_csv_row(
        &mut out,
        &["summary", "total_size_bytes", &image.size_bytes.to_string(), "", ""],
    );
    push_csv_row(
        &mut out,
        &["summary", "wasted_bytes", &image.inefficient_bytes.to_string(), "", ""],
    );
    push_csv_row(
        &mut out,
        &[
            "summary",
            "efficiency_score",
            "",
            "",
            &format!("{:.4}", image.efficiency_score),
        ],
    );

    for file in top_files(&image.file_reference, TOP_FILES) {
        push_csv_row(
            &mut out,
            &[
                "file",
                &file.file,
                &file.size_bytes.to_string(),
                &file.count.to_string(),
                "",
            ],
        );
    }

    out
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const HTML_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>Dive Analysis Summary</title>
  <style>
    body { font-family: Arial, sans-serif; margin: 24px; color: #1f2933; }
    h1 { font-size: 22px; margin-bottom: 4px; }
    .meta { color: #52606d; margin-bottom: 16px; }
    table { border-collapse: collapse; width: 100%; margin-top: 12px; }
    th, td { text-align: left; padding: 8px; border-bottom: 1px solid #e4e7eb; }
    th { background: #f5f7fa; }
  </style>
</head>
<body>
  <h1>Dive Analysis Summary</h1>
"#;

fn render_html(entry: &HistoryEntry, payload: &ExportPayload) -> String {
    let image = &payload.image;
    let completed = entry
        .metadata
        .completed_at
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string();

    let mut out = String::from(HTML_HEAD);
    // Writing into a String cannot fail.
    let _ = writeln!(
        out,
        "  <div class=\"meta\">Image: {} &bull; Completed: {}</div>",
        escape_html(&entry.metadata.image),
        escape_html(&completed)
    );
    out.push_str("  <table>\n    <tr><th>Metric</th><th>Value</th></tr>\n");
    let _ = writeln!(
        out,
        "    <tr><td>Total size (bytes)</td><td>{}</td></tr>",
        image.size_bytes
    );
    let _ = writeln!(
        out,
        "    <tr><td>Wasted bytes</td><td>{}</td></tr>",
        image.inefficient_bytes
    );
    let _ = writeln!(
        out,
        "    <tr><td>Efficiency score</td><td>{:.4}</td></tr>",
        image.efficiency_score
    );
    out.push_str("  </table>\n  <h2>Largest files</h2>\n  <table>\n");
    out.push_str("    <tr><th>File</th><th>Size (bytes)</th><th>Count</th></tr>\n");
    for file in top_files(&image.file_reference, TOP_FILES) {
        let _ = writeln!(
            out,
            "    <tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&file.file),
            file.size_bytes,
            file.count
        );
    }
    out.push_str("  </table>\n</body>\n</html>\n");
    out
}
