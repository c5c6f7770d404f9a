//! Bolt message framing for tokio_util.
//!
//! A message body is split into chunks, each prefixed with its length as a
//! big-endian `u16`. A zero-length chunk ends the message. Chunk boundaries
//! carry no meaning, so the decoder reassembles the whole body before it
//! looks at the signature.

use std::io;
use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::message::{Request, Response};
use super::packstream::{self, PackStreamError, PackStreamStructure, PackStreamValue};

/// Largest chunk payload the length prefix can describe.
pub const MAX_CHUNK_SIZE: usize = u16::MAX as usize;

/// Default cap on a reassembled message body (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Framing and body errors. Anything but `Io` means the byte stream can no
/// longer be trusted.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed message body: {0}")]
    Body(#[from] PackStreamError),
    #[error("message body is a {0}, not a structure")]
    NotAStructure(&'static str),
    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },
    #[error("stream ended inside a message ({0} bytes pending)")]
    Truncated(usize),
}

/// Splits `body` into chunks and appends them, plus the end marker, to `dst`.
pub fn write_chunked(body: &[u8], dst: &mut BytesMut) {
    dst.reserve(body.len() + 2 * (body.len() / MAX_CHUNK_SIZE + 2));
    for chunk in body.chunks(MAX_CHUNK_SIZE) {
        dst.put_u16(chunk.len() as u16);
        dst.put_slice(chunk);
    }
    dst.put_u16(0);
}

/// Chunk reassembly, independent of what the body contains.
#[derive(Debug)]
pub struct ChunkCodec {
    max_message_size: usize,
    body: BytesMut,
}

impl ChunkCodec {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size, body: BytesMut::new() }
    }
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl Decoder for ChunkCodec {
    type Item = BytesMut;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, CodecError> {
        loop {
            if src.len() < 2 {
                return Ok(None);
            }
            let len = u16::from_be_bytes([src[0], src[1]]) as usize;

            if len == 0 {
                src.advance(2);
                if self.body.is_empty() {
                    // NOOP keep-alive between messages.
                    continue;
                }
                return Ok(Some(self.body.split()));
            }

            if src.len() < 2 + len {
                src.reserve(2 + len - src.len());
                return Ok(None);
            }

            let size = self.body.len() + len;
            if size > self.max_message_size {
                return Err(CodecError::MessageTooLarge { size, max: self.max_message_size });
            }

            src.advance(2);
            self.body.extend_from_slice(&src[..len]);
            src.advance(len);
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, CodecError> {
        match self.decode(src)? {
            Some(body) => Ok(Some(body)),
            None if src.is_empty() && self.body.is_empty() => Ok(None),
            None => Err(CodecError::Truncated(src.len() + self.body.len())),
        }
    }
}

/// Which side of the conversation a [`BoltCodec`] speaks for.
pub trait Side {
    type Inbound;
    type Outbound;

    fn parse(s: PackStreamStructure) -> Result<Self::Inbound, PackStreamError>;
    fn structure(item: &Self::Outbound) -> PackStreamStructure;
}

/// Client side: sends requests, reads responses.
#[derive(Debug)]
pub enum Client {}

/// Server side: reads requests, sends responses.
#[derive(Debug)]
pub enum Server {}

impl Side for Client {
    type Inbound = Response;
    type Outbound = Request;

    fn parse(s: PackStreamStructure) -> Result<Response, PackStreamError> {
        Response::from_structure(s)
    }

    fn structure(item: &Request) -> PackStreamStructure {
        item.to_structure()
    }
}

impl Side for Server {
    type Inbound = Request;
    type Outbound = Response;

    fn parse(s: PackStreamStructure) -> Result<Request, PackStreamError> {
        Request::from_structure(&s)
    }

    fn structure(item: &Response) -> PackStreamStructure {
        item.to_structure()
    }
}

/// Chunking plus PackStream plus message parsing.
#[derive(Debug)]
pub struct BoltCodec<S> {
    chunks: ChunkCodec,
    scratch: BytesMut,
    _side: PhantomData<S>,
}

pub type ClientCodec = BoltCodec<Client>;
pub type ServerCodec = BoltCodec<Server>;

impl<S: Side> BoltCodec<S> {
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max: usize) -> Self {
        Self { chunks: ChunkCodec::new(max), scratch: BytesMut::new(), _side: PhantomData }
    }

    /// Encodes without taking ownership of the message.
    pub fn encode_ref(&mut self, item: &S::Outbound, dst: &mut BytesMut) -> Result<(), CodecError> {
        self.scratch.clear();
        let value = PackStreamValue::Structure(S::structure(item));
        packstream::Packer::new(&mut self.scratch).pack(&value)?;
        write_chunked(&self.scratch, dst);
        Ok(())
    }

    fn parse_body(body: &[u8]) -> Result<S::Inbound, CodecError> {
        match packstream::unpack(body)? {
            PackStreamValue::Structure(s) => Ok(S::parse(s)?),
            other => Err(CodecError::NotAStructure(other.type_name())),
        }
    }
}

impl<S: Side> Default for BoltCodec<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Side> Decoder for BoltCodec<S> {
    type Item = S::Inbound;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<S::Inbound>, CodecError> {
        match self.chunks.decode(src)? {
            Some(body) => Self::parse_body(&body).map(Some),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<S::Inbound>, CodecError> {
        match self.chunks.decode_eof(src)? {
            Some(body) => Self::parse_body(&body).map(Some),
            None => Ok(None),
        }
    }
}

impl<S: Side> Encoder<S::Outbound> for BoltCodec<S> {
    type Error = CodecError;

    fn encode(&mut self, item: S::Outbound, dst: &mut BytesMut) -> Result<(), CodecError> {
        self.encode_ref(&item, dst)
    }
}

/// Encodes one request into a framed byte buffer.
pub fn encode_request(request: &Request) -> Result<BytesMut, CodecError> {
    let mut out = BytesMut::new();
    ClientCodec::new().encode_ref(request, &mut out)?;
    Ok(out)
}

/// Decodes one framed request; the buffer must hold exactly one message.
pub fn decode_request(mut bytes: BytesMut) -> Result<Request, CodecError> {
    let mut codec = ServerCodec::new();
    match codec.decode_eof(&mut bytes)? {
        Some(request) if bytes.is_empty() => Ok(request),
        Some(_) => Err(CodecError::Truncated(bytes.len())),
        None => Err(CodecError::Truncated(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::{Failure, Run, StreamLimit, Success};
    use std::collections::HashMap;

    #[test]
    fn test_small_message_is_one_chunk() {
        let bytes = encode_request(&Request::Reset).unwrap();
        assert_eq!(&bytes[..], &[0x00, 0x02, 0xB0, 0x0F, 0x00, 0x00]);
    }

    #[test]
    fn test_large_message_round_trips_across_chunks() {
        let mut params = HashMap::new();
        params.insert("blob".to_string(), PackStreamValue::String("z".repeat(200_000)));
        let request = Request::Run(Run::new("CREATE (:Doc {body: $blob})", params));

        let bytes = encode_request(&request).unwrap();
        let first = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        assert_eq!(first, MAX_CHUNK_SIZE);
        assert_eq!(&bytes[bytes.len() - 2..], &[0, 0]);

        assert_eq!(decode_request(bytes).unwrap(), request);
    }

    #[test]
    fn test_body_of_exactly_one_full_chunk() {
        let body = vec![0xC0u8; MAX_CHUNK_SIZE];
        let mut framed = BytesMut::new();
        write_chunked(&body, &mut framed);
        assert_eq!(framed.len(), 2 + MAX_CHUNK_SIZE + 2);

        let mut codec = ChunkCodec::default();
        assert_eq!(codec.decode(&mut framed).unwrap().unwrap().len(), MAX_CHUNK_SIZE);
    }

    #[test]
    fn test_decoder_waits_for_partial_input_and_skips_noops() {
        let mut codec = ClientCodec::new();
        let mut framed = BytesMut::new();
        framed.put_u16(0);
        codec.encode(Request::Commit, &mut framed).unwrap();

        let mut server = ServerCodec::new();
        let mut partial = framed.split_to(4);
        assert!(server.decode(&mut partial).unwrap().is_none());
        partial.unsplit(framed);
        assert_eq!(server.decode(&mut partial).unwrap(), Some(Request::Commit));
    }

    #[test]
    fn test_responses_flow_server_to_client() {
        let mut server = ServerCodec::new();
        let mut client = ClientCodec::new();
        let mut wire = BytesMut::new();
        let sent = vec![
            Response::Record(vec![PackStreamValue::Integer(7)]),
            Response::Success(Success::new().with("has_more", false)),
            Response::Failure(Failure::new("Neo.TransientError.General.Busy", "later")),
        ];
        for r in &sent {
            server.encode_ref(r, &mut wire).unwrap();
        }
        let mut received = Vec::new();
        while let Some(r) = client.decode(&mut wire).unwrap() {
            received.push(r);
        }
        assert_eq!(received, sent);
    }

    #[test]
    fn test_unknown_signature_is_a_body_error() {
        let mut framed = BytesMut::new();
        write_chunked(&[0xB0, 0x42], &mut framed);
        assert!(matches!(ClientCodec::new().decode(&mut framed), Err(CodecError::Body(_))));
    }

    #[test]
    fn test_non_structure_body_is_rejected() {
        let mut framed = BytesMut::new();
        write_chunked(&[0x01], &mut framed);
        assert!(matches!(
            ClientCodec::new().decode(&mut framed),
            Err(CodecError::NotAStructure("Integer"))
        ));
    }

    #[test]
    fn test_truncated_stream_at_eof() {
        let mut framed = encode_request(&Request::Pull(StreamLimit::all())).unwrap();
        framed.truncate(framed.len() - 3);
        let mut codec = ServerCodec::new();
        assert!(matches!(codec.decode_eof(&mut framed), Err(CodecError::Truncated(_))));
    }

    #[test]
    fn test_oversized_message_is_rejected() {
        let mut framed = BytesMut::new();
        write_chunked(&[0xC0; 64], &mut framed);
        let mut codec = ChunkCodec::new(32);
        assert!(matches!(codec.decode(&mut framed), Err(CodecError::MessageTooLarge { .. })));
    }
}
