//! Data model shared by the exchange load generator crates.
//!
//! The exchange server speaks two request documents, `<create>` and
//! `<transactions>`, and answers every request with a `<results>` document.
//! This crate holds the structured form of both requests, the XML renderer
//! that turns them into wire text, and a cheap scanner for responses.
//!
//! # Modules
//!
//! - [`request`] - `CreateRequest`, `TransactionRequest` and their elements
//! - [`xml`] - structured request → XML text
//! - [`response`] - terminal marker and element counts for `<results>`
//!
//! # Example
//!
//! ```rust
//! use exchange_types::{render_payload, Action, Payload, Query, TransactionRequest};
//!
//! let request = TransactionRequest {
//!     account_id: "ACCT_0001".to_string(),
//!     actions: vec![Action::Query(Query { trans_id: "7".to_string() })],
//! };
//! let xml = render_payload(&Payload::Transaction(request)).unwrap();
//! assert!(xml.ends_with("<transactions id=\"ACCT_0001\"><query id=\"7\"/></transactions>"));
//! ```

pub mod request;
pub mod response;
pub mod xml;

pub use request::{
    Account, Action, Cancel, CreateElement, CreateRequest, Order, Payload, Query, RequestKind,
    Symbol, SymbolAccount, TransactionRequest,
};
pub use response::{ResponseSummary, RESULTS_MARKER};
pub use xml::{render_payload, RenderError, Renderer, XmlRenderer, XML_DECLARATION};
