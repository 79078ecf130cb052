use colored::{ColoredString, Colorize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::progress::Finding;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" | "plain" => Some(Self::Text),
            "json" | "jsonl" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".json") || lower.ends_with(".jsonl") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".txt") {
        return Some(OutputFormat::Text);
    }
    None
}

/// Display switches that only affect how a finding is printed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub no_status: bool,
    pub hide_length: bool,
    pub color: bool,
}

fn paint_status(status: u16, text: String) -> ColoredString {
    match status {
        200..=299 => text.green(),
        300..=399 => text.cyan(),
        400..=499 => text.yellow(),
        500..=599 => text.red(),
        _ => text.normal(),
    }
}

/// `/admin                (Status: 301) [Size: 14] [--> /admin/]`
pub fn render_text(finding: &Finding, opts: &RenderOptions) -> String {
    let mut line = format!("{:<20}", finding.entity);
    if !opts.no_status {
        if let Some(status) = finding.status {
            let text = format!("(Status: {status})");
            if opts.color {
                line.push_str(&format!(" {}", paint_status(status, text)));
            } else {
                line.push(' ');
                line.push_str(&text);
            }
        }
    }
    if !opts.hide_length {
        if let Some(length) = finding.length {
            line.push_str(&format!(" [Size: {length}]"));
        }
    }
    if let Some(location) = finding.redirect.as_deref() {
        let text = format!("[--> {location}]");
        if opts.color {
            line.push_str(&format!(" {}", text.blue()));
        } else {
            line.push(' ');
            line.push_str(&text);
        }
    }
    line.trim_end().to_string()
}

/// Suppressed fields are left out of the object entirely.
pub fn render_json(finding: &Finding, opts: &RenderOptions) -> String {
    let mut record = finding.clone();
    if opts.no_status {
        record.status = None;
    }
    if opts.hide_length {
        record.length = None;
    }
    serde_json::to_string(&record).unwrap_or_else(|_| "{}".to_string())
}

pub fn render(finding: &Finding, format: OutputFormat, opts: &RenderOptions) -> String {
    match format {
        OutputFormat::Text => render_text(finding, opts),
        OutputFormat::Json => render_json(finding, opts),
    }
}

/// Appends findings to the `--output` file, one per line and never coloured.
#[derive(Debug)]
pub struct OutputWriter {
    file: File,
    format: OutputFormat,
    opts: RenderOptions,
}

impl OutputWriter {
    /// Truncates `path` unless `append` is set.
    pub async fn open(
        path: &str,
        append: bool,
        format: OutputFormat,
        opts: RenderOptions,
    ) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .await?;
        Ok(Self {
            file,
            format,
            opts: RenderOptions {
                color: false,
                ..opts
            },
        })
    }

    pub async fn write(&mut self, finding: &Finding) -> std::io::Result<()> {
        let mut line = render(finding, self.format, &self.opts);
        line.push('\n');
        self.file.write_all(line.as_bytes()).await
    }

    pub async fn finish(mut self) -> std::io::Result<()> {
        self.file.flush().await
    }
}
