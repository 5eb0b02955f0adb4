//! Individual value generators used to build request payloads.
//!
//! Each generator draws from the caller's random source so a seeded
//! payload generator stays reproducible end to end.

pub mod ids;
pub mod mix;
pub mod numeric;
pub mod trans_ids;

pub use ids::{IdSource, RandomDigitIds, SequentialIds};
pub use mix::RequestMix;
pub use trans_ids::{TransIdMode, TransIdPool};
