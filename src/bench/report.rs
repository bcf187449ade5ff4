/// Benchmark result records, per-mode summary, text tables and JSON report.
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::{BenchError, QueryMode, round_to};

/// Metrics of one timed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryBenchmarkResult {
    pub query: String,
    pub mode: QueryMode,
    pub execution_time_ms: f64,
    pub entities_count: usize,
    /// Answer length in characters.
    pub response_length: usize,
    pub timestamp: String,
}

/// Aggregates over every query run in one mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeSummary {
    pub avg_time_ms: f64,
    pub total_time_ms: f64,
    pub avg_entities: f64,
    pub avg_response_length: f64,
    pub queries_count: usize,
}

/// Per-mode aggregates keyed by mode; serialized as a JSON object.
pub type Summary = BTreeMap<QueryMode, ModeSummary>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub model_name: String,
    pub embedding_model: String,
    pub total_queries: usize,
    pub results: Vec<QueryBenchmarkResult>,
    pub summary: Summary,
    pub generated_at: String,
}

/// Summarize `results` per mode, in [`QueryMode::ALL`] order.
///
/// Modes without results are left out.
#[must_use]
pub fn summarize(results: &[QueryBenchmarkResult]) -> Summary {
    QueryMode::ALL
        .into_iter()
        .filter_map(|mode| {
            let runs: Vec<&QueryBenchmarkResult> =
                results.iter().filter(|r| r.mode == mode).collect();
            if runs.is_empty() {
                return None;
            }
            let n = runs.len() as f64;
            let total_time: f64 = runs.iter().map(|r| r.execution_time_ms).sum();
            let entities: usize = runs.iter().map(|r| r.entities_count).sum();
            let length: usize = runs.iter().map(|r| r.response_length).sum();

            let stats = ModeSummary {
                avg_time_ms: round_to(total_time / n, 2),
                total_time_ms: round_to(total_time, 2),
                avg_entities: round_to(entities as f64 / n, 1),
                avg_response_length: round_to(length as f64 / n, 0),
                queries_count: runs.len(),
            };
            Some((mode, stats))
        })
        .collect()
}

/// Fastest, slowest and most detailed modes plus the slowest/fastest ratio.
///
/// Ties go to the mode that comes first in [`QueryMode::ALL`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct Highlights {
    pub fastest: (QueryMode, ModeSummary),
    pub slowest: (QueryMode, ModeSummary),
    pub most_detailed: (QueryMode, ModeSummary),
    pub speedup: f64,
}

/// The first entry whose `key` is largest.
fn first_max_by<F>(summary: &Summary, key: F) -> Option<(&QueryMode, &ModeSummary)>
where
    F: Fn(&ModeSummary) -> f64,
{
    summary.iter().fold(None, |best, (mode, stats)| match best {
        Some((_, b)) if key(stats) <= key(b) => best,
        _ => Some((mode, stats)),
    })
}

#[must_use]
pub fn highlights(summary: &Summary) -> Option<Highlights> {
    // min_by already keeps the first of equal elements
    let fastest = summary
        .iter()
        .min_by(|a, b| a.1.avg_time_ms.total_cmp(&b.1.avg_time_ms))?;
    let slowest = first_max_by(summary, |s| s.avg_time_ms)?;
    let most_detailed = first_max_by(summary, |s| s.avg_response_length)?;

    let speedup = if fastest.1.avg_time_ms > 0.0 {
        slowest.1.avg_time_ms / fastest.1.avg_time_ms
    } else {
        0.0
    };

    Some(Highlights {
        fastest: (*fastest.0, fastest.1.clone()),
        slowest: (*slowest.0, slowest.1.clone()),
        most_detailed: (*most_detailed.0, most_detailed.1.clone()),
        speedup,
    })
}

/// Per-query table, grouped under each question.
#[must_use]
pub fn render_results_table(results: &[QueryBenchmarkResult]) -> String {
    let mut out = String::new();
    let rule = "=".repeat(100);

    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(out, "📊 BENCHMARK REPORT - QUERY MODE COMPARISON");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "\n{:<40} {:<10} {:<12} {:<10} {:<12}",
        "Query", "Mode", "Time(ms)", "Entities", "Response"
    );
    let _ = writeln!(out, "{}", "-".repeat(100));

    let mut current: Option<&str> = None;
    for result in results {
        if current != Some(result.query.as_str()) {
            current = Some(result.query.as_str());
            let _ = writeln!(out, "\n🔍 {}", result.query);
        }
        let _ = writeln!(
            out,
            "{:<40} {:<10} {:<12.2} {:<10} {:<12}",
            "",
            result.mode.as_str(),
            result.execution_time_ms,
            result.entities_count,
            result.response_length
        );
    }

    out
}

/// Per-mode summary table followed by the highlights.
#[must_use]
pub fn render_summary(summary: &Summary) -> String {
    let mut out = String::new();
    let rule = "=".repeat(100);

    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(out, "📈 PERFORMANCE SUMMARY BY QUERY MODE");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "\n{:<10} {:<15} {:<18} {:<15} {:<15}",
        "Mode", "Avg Time(ms)", "Total Time(ms)", "Avg Entities", "Avg Response"
    );
    let _ = writeln!(out, "{}", "-".repeat(100));

    for (mode, s) in summary {
        let _ = writeln!(
            out,
            "{:<10} {:<15.2} {:<18.2} {:<15.1} {:<15.0}",
            mode.as_str(),
            s.avg_time_ms,
            s.total_time_ms,
            s.avg_entities,
            s.avg_response_length
        );
    }

    if let Some(h) = highlights(summary) {
        let _ = writeln!(out, "\n{rule}");
        let _ = writeln!(out, "⚡ QUICK TAKE:");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(
            out,
            "  🏃 Fastest: {} ({:.2}ms)",
            h.fastest.0, h.fastest.1.avg_time_ms
        );
        let _ = writeln!(
            out,
            "  🐌 Slowest: {} ({:.2}ms)",
            h.slowest.0, h.slowest.1.avg_time_ms
        );
        let _ = writeln!(
            out,
            "  📝 Most detailed: {} ({:.0} chars)",
            h.most_detailed.0, h.most_detailed.1.avg_response_length
        );
        let _ = writeln!(out, "  📊 Speed spread: {:.2}x", h.speedup);
    }

    out
}

/// File name of a report generated at `at`.
#[must_use]
pub fn report_file_name(at: &DateTime<Local>) -> String {
    format!("benchmark_report_{}.json", at.format("%Y%m%d_%H%M%S"))
}

impl BenchmarkReport {
    #[must_use]
    pub fn new(
        model_name: &str,
        embedding_model: &str,
        results: Vec<QueryBenchmarkResult>,
    ) -> Self {
        let summary = summarize(&results);
        Self {
            model_name: model_name.to_string(),
            embedding_model: embedding_model.to_string(),
            total_queries: results.len(),
            results,
            summary,
            generated_at: Local::now().to_rfc3339(),
        }
    }

    /// Write the report as pretty JSON into `dir`, returning the file path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, BenchError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(report_file_name(&Local::now()));
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn result(query: &str, mode: QueryMode, ms: f64, entities: usize, len: usize) -> QueryBenchmarkResult {
        QueryBenchmarkResult {
            query: query.to_string(),
            mode,
            execution_time_ms: ms,
            entities_count: entities,
            response_length: len,
            timestamp: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    fn sample() -> Vec<QueryBenchmarkResult> {
        vec![
            result("q1", QueryMode::Naive, 100.0, 1, 200),
            result("q1", QueryMode::Hybrid, 400.0, 4, 900),
            result("q2", QueryMode::Naive, 300.0, 2, 400),
            result("q2", QueryMode::Hybrid, 600.0, 5, 1000),
        ]
    }

    #[test]
    fn test_summarize_per_mode() {
        let summary = summarize(&sample());
        assert_eq!(summary.len(), 2);

        let modes: Vec<QueryMode> = summary.keys().copied().collect();
        assert_eq!(modes, vec![QueryMode::Naive, QueryMode::Hybrid]);

        let naive = &summary[&QueryMode::Naive];
        assert_eq!(naive.avg_time_ms, 200.0);
        assert_eq!(naive.total_time_ms, 400.0);
        assert_eq!(naive.avg_entities, 1.5);
        assert_eq!(naive.avg_response_length, 300.0);
        assert_eq!(naive.queries_count, 2);

        assert_eq!(summary[&QueryMode::Hybrid].avg_time_ms, 500.0);
    }

    #[test]
    fn test_highlights() {
        let h = highlights(&summarize(&sample())).unwrap();
        assert_eq!(h.fastest.0, QueryMode::Naive);
        assert_eq!(h.slowest.0, QueryMode::Hybrid);
        assert_eq!(h.most_detailed.0, QueryMode::Hybrid);
        assert_eq!(h.speedup, 2.5);
        assert!(highlights(&Summary::new()).is_none());
    }

    #[test]
    fn test_highlights_ties_pick_first_mode() {
        let summary = summarize(&[
            result("q", QueryMode::Hybrid, 50.0, 0, 300),
            result("q", QueryMode::Local, 50.0, 0, 300),
            result("q", QueryMode::Naive, 50.0, 0, 300),
        ]);
        let h = highlights(&summary).unwrap();
        assert_eq!(h.fastest.0, QueryMode::Naive);
        assert_eq!(h.slowest.0, QueryMode::Naive);
        assert_eq!(h.most_detailed.0, QueryMode::Naive);
        assert_eq!(h.speedup, 1.0);
    }

    #[test]
    fn test_speedup_zero_when_fastest_is_instant() {
        let summary = summarize(&[
            result("q", QueryMode::Naive, 0.0, 0, 1),
            result("q", QueryMode::Local, 10.0, 0, 1),
        ]);
        assert_eq!(highlights(&summary).unwrap().speedup, 0.0);
    }

    #[test]
    fn test_render_tables() {
        let results = sample();
        let table = render_results_table(&results);
        assert_eq!(table.matches("🔍 ").count(), 2);

        let summary = render_summary(&summarize(&results));
        assert!(summary.contains("Fastest: naive (200.00ms)"));
        assert!(summary.contains("Speed spread: 2.50x"));
    }

    #[test]
    fn test_report_file_name() {
        let at = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(report_file_name(&at), "benchmark_report_20240305_140709.json");
    }

    #[test]
    fn test_save_report() {
        let temp = tempfile::tempdir().unwrap();
        let report = BenchmarkReport::new("qwen", "vietnamese-embedding", sample());
        let path = report.save(&temp.path().join("results")).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let loaded: BenchmarkReport = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded.total_queries, 4);
        assert_eq!(loaded.summary.len(), 2);
        assert_eq!(loaded.results[1].mode, QueryMode::Hybrid);

        // Summary is an object keyed by mode name
        let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(raw["summary"]["naive"]["avg_time_ms"], 200.0);
        assert_eq!(raw["summary"]["hybrid"]["queries_count"], 2);
    }
}
