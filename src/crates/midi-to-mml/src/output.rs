use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mml_core::Conversion;

/// How a finished conversion is written out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Mml,
    /// Structured dump of macros and symbols.
    Json,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Default destination next to the working directory, `<stem>.txt` or
    /// `<stem>.json`.
    pub fn default_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let extension = match self.format {
            OutputFormat::Mml => "txt",
            OutputFormat::Json => "json",
        };
        PathBuf::from(format!("{}.{}", stem, extension))
    }

    pub fn build(&self, conversion: &Conversion) -> Result<String> {
        match self.format {
            OutputFormat::Mml => self.build_output(conversion),
            OutputFormat::Json => self.build_output_json(conversion),
        }
    }

    /// Final MML text, post-processed.
    pub fn build_output(&self, conversion: &Conversion) -> Result<String> {
        Ok(conversion.to_mml()?)
    }

    /// JSON output of the macro table and per-track symbols
    pub fn build_output_json(&self, conversion: &Conversion) -> Result<String> {
        let mut json =
            serde_json::to_string_pretty(conversion).context("Failed to serialize conversion")?;
        json.push('\n');
        Ok(json)
    }
}
