//! Unique token generators for account ids.
//!
//! Two sources are provided:
//! - [`SequentialIds`] - `ACCT_0000`, `ACCT_0001`, ... from a per-run counter
//! - [`RandomDigitIds`] - `ACCT_` followed by N random digits
//!
//! Uniqueness is only promised within one generated payload; the
//! generator checks it and asks the source again on a collision.

use rand::{Rng, RngCore};

/// Default account id prefix.
pub const ACCOUNT_PREFIX: &str = "ACCT_";

/// Default number of digits after the prefix.
pub const ACCOUNT_DIGITS: u32 = 4;

/// Source of account id tokens.
pub trait IdSource: Send {
    /// Produce the next token. `rng` is the generator's random source.
    fn next_id(&mut self, rng: &mut dyn RngCore) -> String;
}

/// Counter-backed ids: `{prefix}{counter:0N}`, wrapping after `10^N` ids.
#[derive(Debug, Clone)]
pub struct SequentialIds {
    prefix: String,
    digits: u32,
    next: u64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>, digits: u32) -> Self {
        Self {
            prefix: prefix.into(),
            digits: digits.max(1),
            next: 0,
        }
    }

    /// Start the counter at `start` so parallel generators hand out
    /// disjoint ranges.
    pub fn starting_at(mut self, start: u64) -> Self {
        self.next = start;
        self
    }

    /// Number of distinct ids before the counter wraps.
    pub fn capacity(&self) -> u64 {
        10u64.saturating_pow(self.digits)
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new(ACCOUNT_PREFIX, ACCOUNT_DIGITS)
    }
}

impl IdSource for SequentialIds {
    fn next_id(&mut self, _rng: &mut dyn RngCore) -> String {
        let value = self.next % self.capacity();
        self.next = self.next.wrapping_add(1);
        format!(
            "{}{:0width$}",
            self.prefix,
            value,
            width = self.digits as usize
        )
    }
}

/// Random ids: `{prefix}` followed by `digits` random decimal digits.
#[derive(Debug, Clone)]
pub struct RandomDigitIds {
    prefix: String,
    digits: u32,
}

impl RandomDigitIds {
    pub fn new(prefix: impl Into<String>, digits: u32) -> Self {
        Self {
            prefix: prefix.into(),
            digits: digits.max(1),
        }
    }
}

impl Default for RandomDigitIds {
    fn default() -> Self {
        Self::new(ACCOUNT_PREFIX, ACCOUNT_DIGITS)
    }
}

impl IdSource for RandomDigitIds {
    fn next_id(&mut self, rng: &mut dyn RngCore) -> String {
        let mut id = String::with_capacity(self.prefix.len() + self.digits as usize);
        id.push_str(&self.prefix);
        for _ in 0..self.digits {
            let digit: u8 = rng.gen_range(0..10);
            id.push(char::from(b'0' + digit));
        }
        id
    }
}
