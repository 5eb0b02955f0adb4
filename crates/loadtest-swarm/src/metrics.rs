//! Per-request outcomes and the sinks that receive them.
//!
//! A virtual client hands exactly one [`ResponseOutcome`] per request cycle
//! to a [`MetricsRecorder`]. Recording never blocks and never fails from the
//! client's point of view; whatever happens downstream is the recorder's
//! business.

use exchange_types::{RequestKind, ResponseSummary};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Request type label on every event, matching what load-test dashboards
/// group raw socket traffic under.
pub const REQUEST_TYPE: &str = "TCP";

/// Result of one request cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseOutcome {
    pub success: bool,
    pub latency_ms: u64,
    /// Response bytes consumed from the wire. Zero when nothing completed.
    pub byte_length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable error label (`timeout`, `framing`, `synthesis`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ResponseSummary>,
}

impl ResponseOutcome {
    pub fn success(latency: Duration, byte_length: usize, summary: ResponseSummary) -> Self {
        Self {
            success: true,
            latency_ms: duration_ms(latency),
            byte_length: byte_length as u64,
            error: None,
            error_kind: None,
            summary: Some(summary),
        }
    }

    pub fn failure(latency: Duration, kind: &str, error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            latency_ms: duration_ms(latency),
            byte_length: 0,
            error: Some(format!("{kind}: {error}")),
            error_kind: Some(kind.to_string()),
            summary: None,
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// The event shape handed to external reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsEvent {
    pub request_type: String,
    /// Request kind label.
    pub name: String,
    pub response_time_ms: u64,
    pub response_length: u64,
    /// Error text for failed requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    pub context: EventContext,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ResponseSummary>,
}

impl MetricsEvent {
    pub fn from_outcome(kind: RequestKind, outcome: ResponseOutcome) -> Self {
        Self {
            request_type: REQUEST_TYPE.to_string(),
            name: kind.as_str().to_string(),
            response_time_ms: outcome.latency_ms,
            response_length: outcome.byte_length,
            exception: outcome.error,
            context: EventContext {
                error_kind: outcome.error_kind,
                summary: outcome.summary,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.exception.is_none()
    }
}

/// A sink for request outcomes shared by every client in a swarm.
pub trait MetricsRecorder: Send + Sync {
    fn record(&self, kind: RequestKind, outcome: ResponseOutcome);
}

/// Forwards every outcome as a [`MetricsEvent`] over an unbounded channel.
#[derive(Clone)]
pub struct ChannelRecorder {
    tx: mpsc::UnboundedSender<MetricsEvent>,
}

impl ChannelRecorder {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MetricsEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MetricsRecorder for ChannelRecorder {
    fn record(&self, kind: RequestKind, outcome: ResponseOutcome) {
        // A closed receiver means reporting has stopped; the client carries on.
        let _ = self.tx.send(MetricsEvent::from_outcome(kind, outcome));
    }
}

/// Lock-free success/failure counters per request kind.
#[derive(Debug, Default)]
pub struct CountingRecorder {
    create_ok: AtomicU64,
    create_failed: AtomicU64,
    transaction_ok: AtomicU64,
    transaction_failed: AtomicU64,
}

impl CountingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn successes(&self, kind: RequestKind) -> u64 {
        match kind {
            RequestKind::Create => self.create_ok.load(Ordering::Relaxed),
            RequestKind::Transaction => self.transaction_ok.load(Ordering::Relaxed),
        }
    }

    pub fn failures(&self, kind: RequestKind) -> u64 {
        match kind {
            RequestKind::Create => self.create_failed.load(Ordering::Relaxed),
            RequestKind::Transaction => self.transaction_failed.load(Ordering::Relaxed),
        }
    }

    pub fn total(&self) -> u64 {
        RequestKind::ALL
            .iter()
            .map(|&k| self.successes(k) + self.failures(k))
            .sum()
    }
}

impl MetricsRecorder for CountingRecorder {
    fn record(&self, kind: RequestKind, outcome: ResponseOutcome) {
        let counter = match (kind, outcome.success) {
            (RequestKind::Create, true) => &self.create_ok,
            (RequestKind::Create, false) => &self.create_failed,
            (RequestKind::Transaction, true) => &self.transaction_ok,
            (RequestKind::Transaction, false) => &self.transaction_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Sends each outcome to several recorders.
pub struct FanoutRecorder {
    sinks: Vec<std::sync::Arc<dyn MetricsRecorder>>,
}

impl FanoutRecorder {
    pub fn new(sinks: Vec<std::sync::Arc<dyn MetricsRecorder>>) -> Self {
        Self { sinks }
    }
}

impl MetricsRecorder for FanoutRecorder {
    fn record(&self, kind: RequestKind, outcome: ResponseOutcome) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(kind, outcome.clone());
            }
            last.record(kind, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_outcome_constructors() {
        let ok = ResponseOutcome::success(
            Duration::from_micros(12_900),
            21,
            ResponseSummary::scan(b"<results><created id=\"1\"/></results>"),
        );
        assert!(ok.success);
        assert_eq!(ok.latency_ms, 12);
        assert_eq!(ok.byte_length, 21);
        assert_eq!(ok.summary.map(|s| s.created), Some(1));

        let failed = ResponseOutcome::failure(Duration::from_millis(5), "timeout", "no response");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("timeout: no response"));
        assert_eq!(failed.error_kind.as_deref(), Some("timeout"));
        assert_eq!(failed.byte_length, 0);
    }

    #[test]
    fn test_event_shape() {
        let outcome = ResponseOutcome::failure(Duration::from_millis(7), "framing", "bad prefix");
        let event = MetricsEvent::from_outcome(RequestKind::Transaction, outcome);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["request_type"], "TCP");
        assert_eq!(json["name"], "transaction");
        assert_eq!(json["response_time_ms"], 7);
        assert_eq!(json["response_length"], 0);
        assert_eq!(json["exception"], "framing: bad prefix");
        assert_eq!(json["context"]["error_kind"], "framing");
        assert!(!event.is_success());
    }

    #[tokio::test]
    async fn test_channel_recorder_forwards_and_tolerates_closed_receiver() {
        let (recorder, mut rx) = ChannelRecorder::channel();
        recorder.record(
            RequestKind::Create,
            ResponseOutcome::success(Duration::ZERO, 3, ResponseSummary::default()),
        );
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "create");
        assert!(event.is_success());

        drop(rx);
        recorder.record(
            RequestKind::Create,
            ResponseOutcome::failure(Duration::ZERO, "closed", "eof"),
        );
    }

    #[tokio::test]
    async fn test_counting_recorder_concurrent_records() {
        let recorder = Arc::new(CountingRecorder::new());
        let mut tasks = Vec::new();
        for i in 0..8 {
            let recorder = recorder.clone();
            tasks.push(tokio::spawn(async move {
                for j in 0..100 {
                    let kind = if (i + j) % 2 == 0 {
                        RequestKind::Create
                    } else {
                        RequestKind::Transaction
                    };
                    let outcome = if j % 10 == 0 {
                        ResponseOutcome::failure(Duration::ZERO, "timeout", "late")
                    } else {
                        ResponseOutcome::success(Duration::ZERO, 1, ResponseSummary::default())
                    };
                    recorder.record(kind, outcome);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(recorder.total(), 800);
        let failures =
            recorder.failures(RequestKind::Create) + recorder.failures(RequestKind::Transaction);
        assert_eq!(failures, 80);
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Arc::new(CountingRecorder::new());
        let b = Arc::new(CountingRecorder::new());
        let sinks: Vec<Arc<dyn MetricsRecorder>> = vec![a.clone(), b.clone()];
        let fanout = FanoutRecorder::new(sinks);
        fanout.record(
            RequestKind::Create,
            ResponseOutcome::success(Duration::ZERO, 1, ResponseSummary::default()),
        );
        assert_eq!(a.successes(RequestKind::Create), 1);
        assert_eq!(b.successes(RequestKind::Create), 1);
    }
}
