//! Aggregation of metrics events into a run report.

use crate::metrics::MetricsEvent;
use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use exchange_types::{RequestKind, ResponseSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// Latency distribution in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub max: u64,
}

impl LatencyStats {
    /// Compute stats from unsorted samples.
    pub fn from_samples(samples: &mut [u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable();
        let sum: u64 = samples.iter().sum();
        Self {
            min: samples[0],
            mean: sum as f64 / samples.len() as f64,
            p50: percentile(samples, 50),
            p95: percentile(samples, 95),
            p99: percentile(samples, 99),
            max: samples[samples.len() - 1],
        }
    }
}

/// Nearest-rank percentile of sorted, non-empty samples.
fn percentile(sorted: &[u64], p: usize) -> u64 {
    let rank = (p * sorted.len()).div_ceil(100);
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Totals for one request kind, or for all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindStats {
    pub name: String,
    pub requests: u64,
    pub failures: u64,
    pub bytes: u64,
    pub latency: LatencyStats,
}

impl KindStats {
    pub fn successes(&self) -> u64 {
        self.requests - self.failures
    }

    pub fn failure_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64
        }
    }
}

/// Everything learned from one swarm run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub clients: usize,
    pub startup_failures: usize,
    pub kinds: Vec<KindStats>,
    pub total: KindStats,
    /// Failure counts by error label.
    pub errors: BTreeMap<String, u64>,
    /// Result elements seen across all successful responses.
    pub responses: ResponseSummary,
}

impl SwarmReport {
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn requests_per_second(&self) -> f64 {
        let secs = self.duration_secs();
        if secs > 0.0 {
            self.total.requests as f64 / secs
        } else {
            0.0
        }
    }
}

#[derive(Default)]
struct KindSamples {
    requests: u64,
    failures: u64,
    bytes: u64,
    latencies: Vec<u64>,
}

impl KindSamples {
    fn add(&mut self, event: &MetricsEvent) {
        self.requests += 1;
        if !event.is_success() {
            self.failures += 1;
        }
        self.bytes += event.response_length;
        self.latencies.push(event.response_time_ms);
    }

    fn finish(mut self, name: &str) -> KindStats {
        KindStats {
            name: name.to_string(),
            requests: self.requests,
            failures: self.failures,
            bytes: self.bytes,
            latency: LatencyStats::from_samples(&mut self.latencies),
        }
    }
}

/// Accumulates events until the run is over.
pub struct Aggregator {
    started_at: DateTime<Utc>,
    kinds: BTreeMap<String, KindSamples>,
    total: KindSamples,
    errors: BTreeMap<String, u64>,
    responses: ResponseSummary,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        let kinds = RequestKind::ALL
            .iter()
            .map(|k| (k.as_str().to_string(), KindSamples::default()))
            .collect();
        Self {
            started_at: Utc::now(),
            kinds,
            total: KindSamples::default(),
            errors: BTreeMap::new(),
            responses: ResponseSummary::default(),
        }
    }

    pub fn add(&mut self, event: &MetricsEvent) {
        self.kinds.entry(event.name.clone()).or_default().add(event);
        self.total.add(event);

        if let Some(ref kind) = event.context.error_kind {
            *self.errors.entry(kind.clone()).or_default() += 1;
        } else if event.exception.is_some() {
            *self.errors.entry("unknown".to_string()).or_default() += 1;
        }
        if let Some(ref summary) = event.context.summary {
            self.responses.created += summary.created;
            self.responses.opened += summary.opened;
            self.responses.status += summary.status;
            self.responses.canceled += summary.canceled;
            self.responses.errors += summary.errors;
        }
    }

    /// Drain `rx` until every sender is gone.
    pub async fn collect(mut self, mut rx: mpsc::UnboundedReceiver<MetricsEvent>) -> Self {
        while let Some(event) = rx.recv().await {
            self.add(&event);
        }
        self
    }

    pub fn finish(self, clients: usize, startup_failures: usize) -> SwarmReport {
        SwarmReport {
            started_at: self.started_at,
            finished_at: Utc::now(),
            clients,
            startup_failures,
            kinds: self
                .kinds
                .into_iter()
                .map(|(name, samples)| samples.finish(&name))
                .collect(),
            total: self.total.finish("TOTAL"),
            errors: self.errors,
            responses: self.responses,
        }
    }
}

/// Format a report as a table.
pub fn format_table(report: &SwarmReport) -> String {
    let mut output = String::new();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Request", "Count", "Failed", "Bytes", "Min", "Mean", "p50", "p95", "p99", "Max",
    ]);

    for stats in report.kinds.iter().chain(std::iter::once(&report.total)) {
        let name_cell = if stats.name == report.total.name {
            Cell::new(&stats.name).fg(Color::Cyan)
        } else {
            Cell::new(&stats.name)
        };
        let failed_cell = if stats.failures > 0 {
            Cell::new(format_number(stats.failures)).fg(Color::Red)
        } else {
            Cell::new("0").fg(Color::Green)
        };
        let l = &stats.latency;
        table.add_row(vec![
            name_cell,
            Cell::new(format_number(stats.requests)),
            failed_cell,
            Cell::new(format_number(stats.bytes)),
            Cell::new(format!("{}ms", l.min)),
            Cell::new(format!("{:.1}ms", l.mean)),
            Cell::new(format!("{}ms", l.p50)),
            Cell::new(format!("{}ms", l.p95)),
            Cell::new(format!("{}ms", l.p99)),
            Cell::new(format!("{}ms", l.max)),
        ]);
    }

    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\nClients: {} ({} failed to start)  Duration: {}  Throughput: {:.1} req/s\n",
        report.clients,
        report.startup_failures,
        format_duration(report.duration_secs()),
        report.requests_per_second()
    ));

    if !report.errors.is_empty() {
        output.push_str("\nErrors:\n");
        for (kind, count) in &report.errors {
            output.push_str(&format!("  {}: {}\n", kind, format_number(*count)));
        }
    }

    let r = &report.responses;
    output.push_str(&format!(
        "\nResults: created {}  opened {}  status {}  canceled {}  error {}\n",
        r.created, r.opened, r.status, r.canceled, r.errors
    ));

    output
}

/// Format a report as markdown.
pub fn format_markdown(report: &SwarmReport) -> String {
    let mut output = String::new();

    output.push_str("# Exchange Load Test Results\n\n");
    output.push_str(&format!(
        "**Finished at:** {}\n\n",
        report.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    output.push_str("## Summary\n\n");
    output.push_str(&format!("- **Clients:** {}\n", report.clients));
    output.push_str(&format!(
        "- **Startup Failures:** {}\n",
        report.startup_failures
    ));
    output.push_str(&format!(
        "- **Requests:** {}\n",
        format_number(report.total.requests)
    ));
    output.push_str(&format!(
        "- **Failure Rate:** {:.2}%\n",
        report.total.failure_rate() * 100.0
    ));
    output.push_str(&format!(
        "- **Duration:** {}\n",
        format_duration(report.duration_secs())
    ));
    output.push_str(&format!(
        "- **Throughput:** {:.1} req/s\n\n",
        report.requests_per_second()
    ));

    output.push_str("## Requests\n\n");
    output.push_str("| Request | Count | Failed | Mean | p50 | p95 | p99 | Max |\n");
    output.push_str("|---------|-------|--------|------|-----|-----|-----|-----|\n");
    for stats in report.kinds.iter().chain(std::iter::once(&report.total)) {
        let l = &stats.latency;
        output.push_str(&format!(
            "| {} | {} | {} | {:.1}ms | {}ms | {}ms | {}ms | {}ms |\n",
            stats.name,
            format_number(stats.requests),
            format_number(stats.failures),
            l.mean,
            l.p50,
            l.p95,
            l.p99,
            l.max
        ));
    }

    if !report.errors.is_empty() {
        output.push_str("\n## Errors\n\n");
        for (kind, count) in &report.errors {
            output.push_str(&format!("- **{}:** {}\n", kind, format_number(*count)));
        }
    }

    output
}

/// Format a report as pretty JSON.
pub fn format_json(report: &SwarmReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Format duration in human-readable format.
fn format_duration(secs: f64) -> String {
    if (secs * 10.0).round() < 600.0 {
        return format!("{secs:.1}s");
    }
    // Round before splitting into units.
    let whole = secs.round() as u64;
    if whole < 3600 {
        format!("{}m {:02}s", whole / 60, whole % 60)
    } else {
        let mins = whole / 60;
        format!("{}h {:02}m", mins / 60, mins % 60)
    }
}

/// Format number with thousands separators.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ResponseOutcome;
    use std::time::Duration;

    fn event(kind: RequestKind, latency_ms: u64, ok: bool) -> MetricsEvent {
        let outcome = if ok {
            ResponseOutcome::success(
                Duration::from_millis(latency_ms),
                100,
                ResponseSummary::scan(b"<results><created id=\"1\"/><error>x</error></results>"),
            )
        } else {
            ResponseOutcome::failure(Duration::from_millis(latency_ms), "timeout", "late")
        };
        MetricsEvent::from_outcome(kind, outcome)
    }

    #[test]
    fn test_latency_stats() {
        let mut samples: Vec<u64> = (1..=100).rev().collect();
        let stats = LatencyStats::from_samples(&mut samples);
        assert_eq!(stats.min, 1);
        assert_eq!(stats.max, 100);
        assert_eq!(stats.p50, 50);
        assert_eq!(stats.p95, 95);
        assert_eq!(stats.p99, 99);
        assert!((stats.mean - 50.5).abs() < f64::EPSILON);

        assert_eq!(LatencyStats::from_samples(&mut []), LatencyStats::default());
        assert_eq!(LatencyStats::from_samples(&mut [7]).p99, 7);
    }

    #[test]
    fn test_aggregate_events() {
        let mut agg = Aggregator::new();
        agg.add(&event(RequestKind::Create, 10, true));
        agg.add(&event(RequestKind::Transaction, 20, true));
        agg.add(&event(RequestKind::Transaction, 30, false));

        let report = agg.finish(4, 1);
        assert_eq!(report.kinds.len(), 2);
        let tx = report
            .kinds
            .iter()
            .find(|k| k.name == "transaction")
            .unwrap();
        assert_eq!(tx.requests, 2);
        assert_eq!(tx.failures, 1);
        assert_eq!(tx.successes(), 1);
        assert_eq!(tx.bytes, 100);
        assert_eq!(report.total.requests, 3);
        assert_eq!(report.errors.get("timeout"), Some(&1));
        assert_eq!(report.responses.created, 2);
        assert_eq!(report.responses.errors, 2);
        assert_eq!(report.startup_failures, 1);
    }

    #[tokio::test]
    async fn test_collect_drains_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        for i in 0..10 {
            tx.send(event(RequestKind::Create, i, i % 2 == 0)).unwrap();
        }
        drop(tx);

        let report = Aggregator::new().collect(rx).await.finish(1, 0);
        assert_eq!(report.total.requests, 10);
        assert_eq!(report.total.failures, 5);
    }

    #[test]
    fn test_formats_mention_every_kind() {
        let mut agg = Aggregator::new();
        agg.add(&event(RequestKind::Create, 10, false));
        let report = agg.finish(1, 0);

        let table = format_table(&report);
        assert!(table.contains("create"));
        assert!(table.contains("transaction"));
        assert!(table.contains("TOTAL"));
        assert!(table.contains("timeout: 1"));

        let markdown = format_markdown(&report);
        assert!(markdown.contains("| create | 1 | 1 |"));
        assert!(markdown.contains("- **timeout:** 1"));

        let json: serde_json::Value = serde_json::from_str(&format_json(&report).unwrap()).unwrap();
        assert_eq!(json["total"]["requests"], 1);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(5.5), "5.5s");
        assert_eq!(format_duration(65.0), "1m 05s");
        assert_eq!(format_duration(3661.0), "1h 01m");
        assert_eq!(format_duration(59.96), "1m 00s");
        assert_eq!(format_duration(119.96), "2m 00s");
        assert_eq!(format_duration(3599.6), "1h 00m");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1000000), "1,000,000");
    }
}
