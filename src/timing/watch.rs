/// Live tail of the timing log.
///
/// A byte-offset cursor remembers how far the log has been consumed; each
/// poll reads only what was appended since. Only newline-terminated lines are
/// consumed, so a record still being written shows up on a later poll.
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::parse_line;

/// Delay between two polls of the log.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Read cursor over an append-only log file.
#[derive(Debug, Clone)]
pub struct TailCursor {
    path: PathBuf,
    last_position: u64,
}

impl TailCursor {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_position: 0,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn last_position(&self) -> u64 {
        self.last_position
    }

    /// Return the complete lines appended since the previous poll.
    ///
    /// A missing file yields an empty batch and leaves the cursor untouched.
    pub fn poll(&mut self) -> io::Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut file = fs::File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len < self.last_position {
            // Rewritten underneath us; start over from the top.
            debug!("Timing log shrank to {len} bytes, rewinding cursor");
            self.last_position = 0;
        }

        file.seek(SeekFrom::Start(self.last_position))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = &buf[..=last_newline];
        self.last_position += complete.len() as u64;

        Ok(String::from_utf8_lossy(complete)
            .lines()
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect())
    }
}

/// Render one raw log line for the live view, `None` if it does not parse.
#[must_use]
pub fn format_live_line(line: &str) -> Option<String> {
    let event = parse_line(line)?;

    // "2024-01-01T12:34:56.789" -> "12:34:56"
    let clock = event
        .timestamp
        .split_once('T')
        .map_or(event.timestamp.as_str(), |(_, time)| time);
    let clock = clock.split('.').next().unwrap_or(clock);

    let duration = event
        .duration_seconds
        .map(|d| format!(" ⏱️  {d:.2}s"))
        .unwrap_or_default();

    Some(format!(
        "[{clock}] {:<30} | {:<25}{duration}",
        event.filename, event.event
    ))
}

/// Print the lines of one poll, returning how many were rendered.
pub fn print_batch<W: Write>(lines: &[String], out: &mut W) -> io::Result<usize> {
    let mut printed = 0;
    for line in lines {
        if let Some(rendered) = format_live_line(line) {
            writeln!(out, "{rendered}")?;
            printed += 1;
        }
    }
    out.flush()?;
    Ok(printed)
}

/// Poll the log until `cancel` fires, writing each new event to `out`.
///
/// Read failures are logged and retried on the next cycle; the loop only
/// ends through the cancellation token.
pub async fn watch<W: Write>(
    cursor: &mut TailCursor,
    interval: Duration,
    cancel: &CancellationToken,
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "👀 Watching timing log in real-time (Press Ctrl+C to stop)...")?;
    writeln!(out, "{}", "-".repeat(80))?;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match cursor.poll() {
            Ok(lines) => {
                print_batch(&lines, out)?;
            }
            Err(e) => warn!("Failed to read {}: {e}", cursor.path().display()),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    const START: &str = r#"{"filename":"a.pdf","event":"processing_start","timestamp":"2024-01-01T08:15:30.123456","unix_time":1000}"#;
    const DONE: &str = r#"{"filename":"a.pdf","event":"processing_complete","timestamp":"2024-01-01T08:15:40","unix_time":1010,"duration_seconds":10.0}"#;

    fn append(path: &Path, content: &str) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_poll_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let mut cursor = TailCursor::new(temp.path().join("missing.jsonl"));
        assert!(cursor.poll().unwrap().is_empty());
        assert_eq!(cursor.last_position(), 0);
    }

    #[test]
    fn test_poll_advances_by_appended_bytes() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("timings.jsonl");
        let mut cursor = TailCursor::new(&path);

        let first = format!("{START}\n");
        append(&path, &first);
        let lines = cursor.poll().unwrap();
        assert_eq!(lines, vec![START.to_string()]);
        assert_eq!(cursor.last_position(), first.len() as u64);

        let second = format!("not valid json\n{DONE}\n");
        append(&path, &second);
        let lines = cursor.poll().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(cursor.last_position(), (first.len() + second.len()) as u64);

        // Nothing new
        assert!(cursor.poll().unwrap().is_empty());
    }

    #[test]
    fn test_poll_leaves_partial_line() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("timings.jsonl");
        let mut cursor = TailCursor::new(&path);

        append(&path, &format!("{START}\n{{\"filename\":"));
        let lines = cursor.poll().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(cursor.last_position(), START.len() as u64 + 1);

        append(&path, "\"b.pdf\",\"event\":\"x\",\"timestamp\":\"t\",\"unix_time\":1}\n");
        let lines = cursor.poll().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(parse_line(&lines[0]).is_some());
    }

    #[test]
    fn test_format_live_line() {
        let line = format_live_line(START).unwrap();
        assert!(line.starts_with("[08:15:30] a.pdf"));
        assert!(line.ends_with("processing_start         "));

        let line = format_live_line(DONE).unwrap();
        assert!(line.starts_with("[08:15:40] "));
        assert!(line.ends_with(" ⏱️  10.00s"));

        assert!(format_live_line("not valid json").is_none());
    }

    #[test]
    fn test_print_batch_counts_rendered() {
        let mut out = Vec::new();
        let lines = vec![START.to_string(), "junk".to_string(), DONE.to_string()];
        assert_eq!(print_batch(&lines, &mut out).unwrap(), 2);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_watch_stops_on_cancel() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("timings.jsonl");
        append(&path, &format!("{START}\n"));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let mut cursor = TailCursor::new(&path);
        let mut out = Vec::new();
        watch(&mut cursor, Duration::from_millis(10), &cancel, &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[08:15:30] a.pdf"));
        assert!(cursor.last_position() > 0);
    }

    #[tokio::test]
    async fn test_watch_waits_for_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("timings.jsonl");
        let cancel = CancellationToken::new();

        // The log appears only after several empty polls.
        let writer_path = path.clone();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            append(&writer_path, &format!("{DONE}\n"));
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let mut cursor = TailCursor::new(&path);
        let mut out = Vec::new();
        watch(&mut cursor, Duration::from_millis(10), &cancel, &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[08:15:40] a.pdf"));
        assert!(text.contains("⏱️  10.00s"));
        assert_eq!(cursor.last_position(), DONE.len() as u64 + 1);
    }
}
