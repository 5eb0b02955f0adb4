//! Payload synthesizer for the exchange load generator.
//!
//! This crate provides the `PayloadGenerator` which produces randomized but
//! internally consistent `<create>` and `<transactions>` requests. The
//! generator draws every value from an injected random source, so a seeded
//! generator yields the same payload sequence on every run.
//!
//! # Architecture
//!
//! ```text
//!   RequestMix ──pick──▶ RequestKind
//!                             │
//!                             ▼
//! ┌──────────────────────────────────┐
//! │        PayloadGenerator          │
//! │                                  │
//! │  - rng (StdRng or injected)      │
//! │  - ids (IdSource)                │
//! │  - trans_ids (TransIdPool)       │
//! │  - index                         │
//! └────────────────┬─────────────────┘
//!                  │
//!                  ▼
//!     Payload::Create | Payload::Transaction
//! ```
//!
//! # Example
//!
//! ```rust
//! use loadtest_generator::PayloadGenerator;
//!
//! let mut generator = PayloadGenerator::new(42);
//! let create = generator.generate_create().unwrap();
//! assert!(create.len() <= 5);
//!
//! let tx = generator.generate_transaction().unwrap();
//! assert!((1..=5).contains(&tx.actions.len()));
//! ```
//!
//! # Value ranges
//!
//! - account balance: 1000.00 to 100000.00
//! - order amount: -100 to 100 shares
//! - order limit: 10.00 to 100.00
//! - transaction id: 1 to 10000
//! - symbol shares per account: 1 to 1000

pub mod generator;
pub mod generators;

// Re-exports for convenience
pub use generator::{GeneratorError, PayloadGenerator, PayloadSource, SYMBOLS};
pub use generators::{IdSource, RandomDigitIds, RequestMix, SequentialIds, TransIdMode};
