//! Exchange load generator.
//!
//! Drives the exchange server's length-prefixed XML protocol with many
//! concurrent virtual clients, each issuing randomized `create` and
//! `transactions` requests over its own persistent connection.
//!
//! # Crates
//!
//! - `exchange_types` - request documents, XML rendering, response summaries
//! - `loadtest_generator` - randomized payload synthesis
//! - `exchange_wire` - framing codec and connections
//! - `loadtest_swarm` - virtual clients, metrics, swarm runner and reports
//!
//! # CLI Usage
//!
//! ```bash
//! # 50 clients for 30 seconds against a local exchange
//! exchange-loadtest run --host 127.0.0.1 --port 12345 --clients 50 --duration 30s
//!
//! # Settings from a file, report as markdown
//! exchange-loadtest run --config swarm.yaml --output markdown
//!
//! # Print five framed sample requests
//! exchange-loadtest generate --count 5 --framed
//! ```

pub mod generate;
pub mod testing;

pub use exchange_types as types;
pub use exchange_wire as wire;
pub use loadtest_generator as generator;
pub use loadtest_swarm as swarm;
