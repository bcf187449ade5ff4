/// Aggregated timing report: per-event-type statistics and per-file timelines.
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use super::{TimingError, TimingEvent, load_events};

const WIDE: usize = 80;
const NARROW: usize = 40;

/// Duration statistics for one event label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTypeStats {
    /// Every event carrying this label, with or without a duration.
    pub count: usize,
    pub total_duration: f64,
    pub durations: Vec<f64>,
}

impl EventTypeStats {
    fn record(&mut self, event: &TimingEvent) {
        self.count += 1;
        if let Some(duration) = event.duration_seconds {
            self.total_duration += duration;
            self.durations.push(duration);
        }
    }

    /// Mean over the events that carried a duration, 0 when none did.
    #[must_use]
    pub fn avg(&self) -> f64 {
        if self.durations.is_empty() {
            0.0
        } else {
            self.total_duration / self.durations.len() as f64
        }
    }

    #[must_use]
    pub fn min(&self) -> f64 {
        self.durations.iter().copied().reduce(f64::min).unwrap_or(0.0)
    }

    #[must_use]
    pub fn max(&self) -> f64 {
        self.durations.iter().copied().reduce(f64::max).unwrap_or(0.0)
    }
}

/// Time-ordered events of one file plus its processing boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTimeline {
    pub filename: String,
    pub events: Vec<TimingEvent>,
    /// `unix_time` of the first start-like event.
    pub start_time: Option<f64>,
    /// `unix_time` of the last completion-like event.
    pub end_time: Option<f64>,
}

impl FileTimeline {
    fn new(filename: String, mut events: Vec<TimingEvent>) -> Self {
        // Stable sort keeps log order for identical timestamps.
        events.sort_by(|a, b| a.unix_time.total_cmp(&b.unix_time));

        let mut start_time = None;
        let mut end_time = None;
        for event in &events {
            if event.is_start() && start_time.is_none() {
                start_time = Some(event.unix_time);
            }
            if event.is_complete() {
                end_time = Some(event.unix_time);
            }
        }

        Self {
            filename,
            events,
            start_time,
            end_time,
        }
    }

    /// Elapsed processing time, defined only when both boundaries exist.
    #[must_use]
    pub fn total_duration(&self) -> Option<f64> {
        Some(self.end_time? - self.start_time?)
    }
}

/// Derived views over one load of the timing log.
#[derive(Debug, Clone, Default)]
pub struct TimingReport {
    pub total_events: usize,
    /// Keyed by event label, iterated in ascending order.
    pub event_stats: BTreeMap<String, EventTypeStats>,
    /// Sorted by filename ascending.
    pub timelines: Vec<FileTimeline>,
}

impl TimingReport {
    #[must_use]
    pub fn from_events(events: &[TimingEvent]) -> Self {
        let mut by_file: BTreeMap<String, Vec<TimingEvent>> = BTreeMap::new();
        let mut event_stats: BTreeMap<String, EventTypeStats> = BTreeMap::new();

        for event in events {
            by_file
                .entry(event.filename.clone())
                .or_default()
                .push(event.clone());
            event_stats
                .entry(event.event.clone())
                .or_default()
                .record(event);
        }

        let timelines = by_file
            .into_iter()
            .map(|(filename, events)| FileTimeline::new(filename, events))
            .collect();

        Self {
            total_events: events.len(),
            event_stats,
            timelines,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_events == 0
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.timelines.len()
    }

    #[must_use]
    pub fn timeline(&self, filename: &str) -> Option<&FileTimeline> {
        self.timelines.iter().find(|t| t.filename == filename)
    }
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heavy = "=".repeat(WIDE);
        let light = "-".repeat(WIDE);

        writeln!(f, "\n{heavy}")?;
        writeln!(f, "📊 LIGHT RAG FILE PROCESSING TIMING REPORT")?;
        writeln!(f, "{heavy}")?;
        writeln!(f, "\nTotal files processed: {}", self.file_count())?;
        writeln!(f, "Total timing events: {}", self.total_events)?;

        writeln!(f, "\n{light}")?;
        writeln!(f, "⏱️  TIMING STATISTICS BY EVENT TYPE")?;
        writeln!(f, "{light}")?;
        writeln!(
            f,
            "{:<30} {:<8} {:<12} {:<12} {:<12} {:<12}",
            "Event", "Count", "Total(s)", "Avg(s)", "Min(s)", "Max(s)"
        )?;
        writeln!(f, "{light}")?;
        for (event, stats) in &self.event_stats {
            writeln!(
                f,
                "{:<30} {:<8} {:<12.2} {:<12.2} {:<12.2} {:<12.2}",
                event,
                stats.count,
                stats.total_duration,
                stats.avg(),
                stats.min(),
                stats.max()
            )?;
        }

        writeln!(f, "\n{light}")?;
        writeln!(f, "📁 DETAILED REPORT BY FILE")?;
        writeln!(f, "{light}")?;
        for timeline in &self.timelines {
            writeln!(f, "\n📄 {}", timeline.filename)?;
            writeln!(f, "{}", "-".repeat(NARROW))?;
            for event in &timeline.events {
                let duration = event
                    .duration_seconds
                    .map_or_else(|| "-".to_string(), |d| format!("{d:.2}s"));
                writeln!(
                    f,
                    "  {} | {:<25} | {}",
                    event.timestamp, event.event, duration
                )?;
            }
            if let Some(total) = timeline.total_duration() {
                writeln!(f, "  {:12} Total processing time: {total:.2}s", "")?;
            }
        }

        writeln!(f, "\n{heavy}")
    }
}

/// Load the log at `path` and render the full text report.
///
/// Never fails: a missing log yields a warning line, and an empty dataset
/// yields the "no data" line alone.
#[must_use]
pub fn render_report(path: &Path) -> String {
    let mut out = String::new();

    let events = match load_events(path) {
        Ok(events) => events,
        Err(e @ TimingError::NotFound(_)) => {
            out.push_str(&format!("⚠️  {e}\n"));
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("{e}");
            out.push_str(&format!("⚠️  {e}\n"));
            Vec::new()
        }
    };

    if events.is_empty() {
        out.push_str("❌ No timing data available\n");
        return out;
    }

    out.push_str(&TimingReport::from_events(&events).to_string());
    out
}
