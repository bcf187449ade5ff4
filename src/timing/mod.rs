/// File-processing timing log: record type, loader, report and live tail.
///
/// The log is an append-only JSONL file written by the LightRAG server while
/// it processes uploaded documents. This module only ever reads it.
pub mod report;
pub mod watch;

use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Fixed location of the timing log, relative to the working directory.
pub const TIMING_LOG_FILE: &str = "logs/file_processing_timings.jsonl";

/// Errors raised while reading the timing log.
#[derive(Error, Debug)]
pub enum TimingError {
    #[error("timing log file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read timing log: {0}")]
    Io(#[from] io::Error),
}

/// One parsed line of the timing log.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimingEvent {
    pub filename: String,
    pub event: String,
    /// ISO-8601 wall-clock time, kept verbatim for display.
    pub timestamp: String,
    /// Epoch seconds, used for ordering and interval arithmetic.
    pub unix_time: f64,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

impl TimingEvent {
    /// Whether this event marks the start of a file's processing.
    #[must_use]
    pub fn is_start(&self) -> bool {
        self.event.to_lowercase().contains("start") || self.event == "processing_start"
    }

    /// Whether this event marks the completion of a file's processing.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.event.to_lowercase().contains("complete") || self.event == "processing_complete"
    }
}

/// Parse a single log line. Blank and malformed lines yield `None`.
#[must_use]
pub fn parse_line(line: &str) -> Option<TimingEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str(line).ok()
}

/// Load every well-formed event from the log, in file order.
pub fn load_events(path: &Path) -> Result<Vec<TimingEvent>, TimingError> {
    if !path.exists() {
        return Err(TimingError::NotFound(path.to_path_buf()));
    }

    let reader = BufReader::new(fs::File::open(path)?);
    let mut events = Vec::new();
    let mut skipped = 0usize;

    for line in reader.split(b'\n') {
        let line = line?;
        let Ok(line) = std::str::from_utf8(&line) else {
            skipped += 1;
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(event) => events.push(event),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::debug!("Skipped {skipped} malformed timing lines in {}", path.display());
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_full_record() {
        let line = r#"{"filename":"a.pdf","event":"processing_complete","timestamp":"2024-01-01T00:00:10","unix_time":1010,"duration_seconds":10.0}"#;
        let event = parse_line(line).unwrap();
        assert_eq!(event.filename, "a.pdf");
        assert_eq!(event.event, "processing_complete");
        assert_eq!(event.unix_time, 1010.0);
        assert_eq!(event.duration_seconds, Some(10.0));
    }

    #[test]
    fn test_parse_line_without_duration() {
        let line = r#"  {"filename":"a.pdf","event":"processing_start","timestamp":"2024-01-01T00:00:00","unix_time":1000}  "#;
        let event = parse_line(line).unwrap();
        assert!(event.duration_seconds.is_none());
    }

    #[test]
    fn test_parse_line_rejects_garbage() {
        assert!(parse_line("not valid json").is_none());
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
        // Missing required field
        assert!(parse_line(r#"{"filename":"a.pdf","event":"x","unix_time":1}"#).is_none());
    }

    #[test]
    fn test_boundary_matching() {
        let mut event = parse_line(
            r#"{"filename":"f","event":"Chunking_START","timestamp":"t","unix_time":1}"#,
        )
        .unwrap();
        assert!(event.is_start());
        assert!(!event.is_complete());

        event.event = "extraction_completed".to_string();
        assert!(event.is_complete());
        assert!(!event.is_start());
    }

    #[test]
    fn test_load_events_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("missing.jsonl");
        match load_events(&path) {
            Err(TimingError::NotFound(p)) => assert_eq!(p, path),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_load_events_skips_malformed() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("timings.jsonl");
        fs::write(
            &path,
            concat!(
                r#"{"filename":"a.pdf","event":"processing_start","timestamp":"2024-01-01T00:00:00","unix_time":1000}"#,
                "\n",
                "not valid json\n",
                "\n",
                r#"{"filename":"b.pdf","event":"processing_start","timestamp":"2024-01-01T00:00:01","unix_time":1001}"#,
                "\n",
            ),
        )
        .unwrap();

        let events = load_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].filename, "a.pdf");
        assert_eq!(events[1].filename, "b.pdf");
    }

    #[test]
    fn test_load_events_skips_invalid_utf8_line() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("timings.jsonl");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(
            br#"{"filename":"a.pdf","event":"processing_start","timestamp":"2024-01-01T00:00:00","unix_time":1000}"#,
        );
        bytes.extend_from_slice(b"\n\xff\xfe garbage\n");
        bytes.extend_from_slice(
            br#"{"filename":"b.pdf","event":"processing_start","timestamp":"2024-01-01T00:00:01","unix_time":1001}"#,
        );
        bytes.push(b'\n');
        fs::write(&path, bytes).unwrap();

        let events = load_events(&path).unwrap();
        let names: Vec<&str> = events.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }
}
