//! Report rendering and sinks
//!
//! A [`Report`] wraps one [`Snapshot`] with the trigger that produced it. Sinks
//! render reports to text (the console layout) or JSON and write them out.
//!
//! Text layout:
//!
//! ```text
//! --------------------------
//! Type Pollution Statistics:
//! --------------------------
//! 1:	app::render:12
//! Count:	1200
//! Types:
//! 	app::Circle
//! 	app::Square
//! Traces:
//! 	app::draw(src/draw.rs:40)
//! --------------------------
//! ```
//!
//! The trailing separator is only written when the report has entries.

use clap::ValueEnum;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use crate::error::ReportError;
use crate::snapshot::Snapshot;

pub const SEPARATOR: &str = "--------------------------";

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    #[default]
    Text,
    /// JSON format for machine parsing
    Json,
}

/// What asked for a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportTrigger {
    Periodic,
    Shutdown,
}

/// One emitted report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// 1-based emission order across both triggers
    pub sequence: u64,
    pub trigger: ReportTrigger,
    /// Whether full captures were enabled when the report was built
    pub full_traces: bool,
    pub entries: Snapshot,
}

impl Report {
    pub fn new(sequence: u64, trigger: ReportTrigger, full_traces: bool, entries: Snapshot) -> Self {
        Report {
            sequence,
            trigger,
            full_traces,
            entries,
        }
    }

    /// Render in the console text layout
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(SEPARATOR);
        out.push_str("\nType Pollution Statistics:\n");

        for (index, entry) in self.entries.iter().enumerate() {
            let _ = writeln!(out, "{}\n{}:\t{}", SEPARATOR, index + 1, entry.site);
            let _ = writeln!(out, "Count:\t{}", entry.update_count);
            out.push_str("Types:\n");
            for seen in &entry.seen_types {
                let _ = writeln!(out, "\t{}", seen);
            }
            out.push_str("Traces:\n");
            for stack in &entry.top_stack_traces {
                let _ = writeln!(out, "\t{}", stack);
            }
            if self.full_traces {
                out.push_str("Full Traces:\n");
                for frames in &entry.full_stack_frames {
                    let _ = writeln!(out, "\t{}", SEPARATOR);
                    for frame in frames {
                        let _ = writeln!(out, "\t{}", frame);
                    }
                }
            }
        }

        if !self.entries.is_empty() {
            let _ = writeln!(out, "{}", SEPARATOR);
        }
        out
    }

    /// Render as a single-line JSON document
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn render(&self, format: OutputFormat) -> Result<String, ReportError> {
        match format {
            OutputFormat::Text => Ok(self.to_text()),
            OutputFormat::Json => {
                let mut json = self.to_json()?;
                json.push('\n');
                Ok(json)
            }
        }
    }
}

/// Destination for emitted reports
///
/// `emit` may be called from the scheduler thread and the shutdown path at
/// the same time; implementations must not interleave two reports.
pub trait ReportSink: Send + Sync {
    fn emit(&self, report: &Report) -> Result<(), ReportError>;
}

/// Writes rendered reports to any `Write`, one report per lock
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
    format: OutputFormat,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        WriterSink {
            writer: Mutex::new(writer),
            format,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> ReportSink for WriterSink<W> {
    fn emit(&self, report: &Report) -> Result<(), ReportError> {
        let rendered = report.render(self.format)?;
        let mut writer = self.writer.lock();
        writer.write_all(rendered.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

/// Sink writing to standard output
pub type ConsoleSink = WriterSink<io::Stdout>;

impl ConsoleSink {
    pub fn stdout(format: OutputFormat) -> Self {
        WriterSink::new(io::stdout(), format)
    }
}

/// Sink appending to a file
pub type FileSink = WriterSink<File>;

impl FileSink {
    pub fn append(path: &Path, format: OutputFormat) -> Result<Self, ReportError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(WriterSink::new(file, format))
    }
}

/// Keeps every emitted report in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<Report>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports emitted so far, in emission order
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl ReportSink for MemorySink {
    fn emit(&self, report: &Report) -> Result<(), ReportError> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}
