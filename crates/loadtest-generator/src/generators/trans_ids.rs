//! Transaction id generation for order, query and cancel actions.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Smallest transaction id handed out.
pub const MIN_TRANS_ID: u32 = 1;

/// Largest transaction id handed out.
pub const MAX_TRANS_ID: u32 = 10_000;

/// Number of previously issued order ids remembered for correlation.
pub const DEFAULT_HISTORY: usize = 1024;

/// How query and cancel actions pick the id they refer to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransIdMode {
    /// Every id is drawn independently. Queries and cancels usually name
    /// orders the server has never seen.
    #[default]
    Independent,
    /// Queries and cancels reuse order ids issued earlier in the same
    /// payload, or in earlier payloads, before falling back to a fresh id.
    Correlated,
}

impl std::fmt::Display for TransIdMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransIdMode::Independent => write!(f, "independent"),
            TransIdMode::Correlated => write!(f, "correlated"),
        }
    }
}

/// Hands out transaction ids and remembers recent order ids.
#[derive(Debug, Clone)]
pub struct TransIdPool {
    mode: TransIdMode,
    history: VecDeque<String>,
    capacity: usize,
}

impl TransIdPool {
    pub fn new(mode: TransIdMode) -> Self {
        Self::with_capacity(mode, DEFAULT_HISTORY)
    }

    pub fn with_capacity(mode: TransIdMode, capacity: usize) -> Self {
        Self {
            mode,
            history: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY)),
            capacity,
        }
    }

    pub fn mode(&self) -> TransIdMode {
        self.mode
    }

    /// Fresh id for a new order. The id is remembered for later reference.
    pub fn issue<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        let id = random_trans_id(rng);
        if self.mode == TransIdMode::Correlated && self.capacity > 0 {
            if self.history.len() == self.capacity {
                self.history.pop_front();
            }
            self.history.push_back(id.clone());
        }
        id
    }

    /// Id for a query or cancel. `issued_in_payload` holds order ids
    /// already issued for the payload being built.
    pub fn reference<R: Rng + ?Sized>(&self, rng: &mut R, issued_in_payload: &[String]) -> String {
        if self.mode == TransIdMode::Correlated {
            if !issued_in_payload.is_empty() {
                let idx = rng.gen_range(0..issued_in_payload.len());
                return issued_in_payload[idx].clone();
            }
            if !self.history.is_empty() {
                let idx = rng.gen_range(0..self.history.len());
                return self.history[idx].clone();
            }
        }
        random_trans_id(rng)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

fn random_trans_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.gen_range(MIN_TRANS_ID..=MAX_TRANS_ID).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_independent_mode_keeps_no_history() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut pool = TransIdPool::new(TransIdMode::Independent);

        for _ in 0..10 {
            pool.issue(&mut rng);
        }
        assert_eq!(pool.history_len(), 0);
    }

    #[test]
    fn test_ids_are_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut pool = TransIdPool::new(TransIdMode::Independent);

        for _ in 0..1000 {
            let id: u32 = pool.issue(&mut rng).parse().unwrap();
            assert!((MIN_TRANS_ID..=MAX_TRANS_ID).contains(&id));
        }
    }

    #[test]
    fn test_correlated_prefers_payload_ids() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut pool = TransIdPool::new(TransIdMode::Correlated);
        pool.issue(&mut rng);

        let in_payload = vec!["12345".to_string()];
        for _ in 0..20 {
            assert_eq!(pool.reference(&mut rng, &in_payload), "12345");
        }
    }

    #[test]
    fn test_correlated_falls_back_to_history() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut pool = TransIdPool::new(TransIdMode::Correlated);
        let issued = pool.issue(&mut rng);

        assert_eq!(pool.reference(&mut rng, &[]), issued);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut pool = TransIdPool::with_capacity(TransIdMode::Correlated, 3);

        for _ in 0..10 {
            pool.issue(&mut rng);
        }
        assert_eq!(pool.history_len(), 3);
    }

    #[test]
    fn test_mode_yaml_names() {
        let mode: TransIdMode = serde_yaml::from_str("correlated").unwrap();
        assert_eq!(mode, TransIdMode::Correlated);
        assert_eq!(TransIdMode::default().to_string(), "independent");
    }
}
