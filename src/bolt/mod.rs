//! # Bolt Protocol Implementation
//!
//! Wire-level pieces of the Bolt protocol, with no I/O of their own:
//!
//! - [`packstream`] - binary value serialization
//! - [`message`] - request and response messages (HELLO, RUN, PULL, ...)
//! - [`handshake`] - preamble and version negotiation bytes
//! - [`codec`] - chunked framing as a tokio_util codec, for both sides
//!
//! Most users want [`crate::driver`], which drives these over a connection.

pub mod codec;
pub mod handshake;
pub mod message;
pub mod packstream;

pub use codec::{ClientCodec, CodecError, ServerCodec};
pub use handshake::{BoltVersion, VersionRange};
pub use message::{Request, Response};
pub use packstream::{PackStreamError, PackStreamStructure, PackStreamValue};
