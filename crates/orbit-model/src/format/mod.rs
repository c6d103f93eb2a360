//! Text chart formats.
//!
//! Two dialects are supported: the current `sat` format with scroll layers
//! and traces, and the legacy `mer` format. Loading is lenient: a malformed
//! line is logged, recorded in the [`LoadReport`] and skipped.

pub mod clipboard;
mod mer;
mod sat;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chart::Chart;
use crate::error::{ChartError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartFormat {
    Sat,
    Mer,
}

impl ChartFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ChartFormat::Sat => "sat",
            ChartFormat::Mer => "mer",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        ext.parse().ok()
    }
}

impl fmt::Display for ChartFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ChartFormat {
    type Err = ChartError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sat" => Ok(ChartFormat::Sat),
            "mer" => Ok(ChartFormat::Mer),
            _ => Err(ChartError::UnknownFormat),
        }
    }
}

/// What a lenient load had to skip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub format: Option<ChartFormat>,
    /// 1-based line numbers that were not understood.
    pub skipped_lines: Vec<usize>,
    /// Chain continuations whose predecessor could not be found.
    pub dropped_links: usize,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped_lines.is_empty() && self.dropped_links == 0
    }

    pub(crate) fn skip(&mut self, line: usize, reason: &str) {
        tracing::warn!(line, reason, "skipping malformed chart line");
        self.skipped_lines.push(line);
    }
}

/// Identify the dialect by its version marker.
pub fn detect_format(text: &str) -> Option<ChartFormat> {
    for line in text.lines().map(str::trim) {
        if line.starts_with("@SAT_VERSION") {
            return Some(ChartFormat::Sat);
        }
        if line.starts_with("#MUSIC_SCORE_VERSION") || line.starts_with("#BODY") {
            return Some(ChartFormat::Mer);
        }
    }
    None
}

/// Decode chart bytes as UTF-8 (BOM tolerated), falling back to Shift-JIS.
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.to_string());
    }

    let (decoded, _, had_errors) = encoding_rs::SHIFT_JIS.decode(bytes);
    if had_errors {
        return Err(ChartError::Encoding);
    }
    Ok(decoded.into_owned())
}

/// Read and decode a chart file without touching any chart.
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| ChartError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    decode_text(&bytes)
}

/// Replace the chart's content with the chart file at `path`.
pub fn load_file<P: AsRef<Path>>(chart: &mut Chart, path: P) -> Result<LoadReport> {
    let path = path.as_ref();
    let text = read_text(path)?;
    let report = load_str(chart, &text)?;
    tracing::info!(
        path = %path.display(),
        notes = chart.note_count(),
        gimmicks = chart.gimmicks().len(),
        skipped = report.skipped_lines.len(),
        "loaded chart"
    );
    Ok(report)
}

/// Replace the chart's content with `text`.
///
/// The chart is cleared only once the dialect is recognized. Loaded entities
/// get ids in file order under namespace 0, so every peer loading the same
/// file agrees on them.
pub fn load_str(chart: &mut Chart, text: &str) -> Result<LoadReport> {
    let format = detect_format(text).ok_or(ChartError::UnknownFormat)?;
    if format == ChartFormat::Mer && !mer::has_body(text) {
        return Err(ChartError::MissingSection("#BODY"));
    }

    let namespace = chart.ids_mut().namespace();
    chart.clear();
    chart.ids_mut().set_namespace(0);

    let mut report = LoadReport {
        format: Some(format),
        ..Default::default()
    };
    match format {
        ChartFormat::Sat => sat::decode(chart, text, &mut report),
        ChartFormat::Mer => mer::decode(chart, text, &mut report),
    }
    chart.ids_mut().set_namespace(namespace);

    chart.sort();
    chart.regenerate_timelines();
    Ok(report)
}

pub fn write_string(chart: &Chart, format: ChartFormat) -> String {
    match format {
        ChartFormat::Sat => sat::encode(chart),
        ChartFormat::Mer => mer::encode(chart),
    }
}

pub fn write_file<P: AsRef<Path>>(chart: &Chart, path: P, format: ChartFormat) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, write_string(chart, format)).map_err(|source| ChartError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), %format, "saved chart");
    Ok(())
}

/// Split a line into whitespace-separated fields.
pub(crate) fn fields(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}
