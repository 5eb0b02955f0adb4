//! Wire layer for the exchange protocol.
//!
//! Every request travels as `<decimal length>\n<xml bytes>`. Responses are
//! read from the stream in 4096-byte chunks and fed to a [`FrameDecoder`]
//! until it recognizes a complete `<results>` document.
//!
//! # Modules
//!
//! - [`codec`] - `encode` and the incremental response decoders
//! - [`connection`] - one persistent socket, one request in flight
//! - [`error`] - the wire error taxonomy
//! - [`testing`] - a scripted in-memory stream for exercising connections
//!
//! # Example
//!
//! ```rust
//! use exchange_wire::{encode, DecodeResult, FrameDecoder, ResponseDecoder};
//!
//! let framed = encode("<results></results>");
//! assert_eq!(&framed[..3], b"19\n");
//!
//! let decoder = ResponseDecoder::default();
//! let mut buffer = Vec::new();
//! match decoder.decode_incremental(&mut buffer, &framed) {
//!     DecodeResult::Complete { payload, .. } => assert_eq!(payload, b"<results></results>"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod testing;

pub use codec::{
    encode, CompletionMode, DecodeResult, FrameDecoder, ResponseDecoder, DEFAULT_MAX_FRAME_LEN,
};
pub use connection::{Connection, Response, READ_CHUNK_SIZE};
pub use error::{ErrorKind, WireError};
