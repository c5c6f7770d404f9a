//! Bolt protocol messages.
//!
//! Requests travel client to server, responses server to client. Both are
//! PackStream structures whose tag is the message signature.

pub mod request;
pub mod response;

pub use request::{Begin, Hello, Request, Run, StreamLimit};
pub use response::{Failure, Response, Success};

/// Message signatures.
pub mod signature {
    pub const HELLO: u8 = 0x01;
    pub const GOODBYE: u8 = 0x02;
    pub const RESET: u8 = 0x0F;
    pub const RUN: u8 = 0x10;
    pub const BEGIN: u8 = 0x11;
    pub const COMMIT: u8 = 0x12;
    pub const ROLLBACK: u8 = 0x13;
    pub const DISCARD: u8 = 0x2F;
    pub const PULL: u8 = 0x3F;
    /// Bolt 5.1+
    pub const LOGON: u8 = 0x6A;
    /// Bolt 5.1+
    pub const LOGOFF: u8 = 0x6B;

    pub const SUCCESS: u8 = 0x70;
    pub const RECORD: u8 = 0x71;
    pub const IGNORED: u8 = 0x7E;
    pub const FAILURE: u8 = 0x7F;
}
