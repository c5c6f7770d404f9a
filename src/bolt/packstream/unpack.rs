//! Deserialization of [`PackStreamValue`]s.

use std::collections::HashMap;

use bytes::Buf;

use super::marker::*;
use super::value::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Nesting limit for lists, maps and structures.
pub const MAX_DEPTH: usize = 256;

/// Reads packed values from a byte slice.
pub struct Unpacker<'a> {
    input: &'a [u8],
    depth: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, depth: 0 }
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> usize {
        self.input.len()
    }

    pub fn unpack(&mut self) -> Result<PackStreamValue, PackStreamError> {
        let marker = self.take_u8()?;

        if is_tiny_int(marker) {
            return Ok(PackStreamValue::Integer(marker as i8 as i64));
        }
        if let Some(n) = tiny_size(marker, TINY_STRING) {
            return self.string(n);
        }
        if let Some(n) = tiny_size(marker, TINY_LIST) {
            return self.list(n);
        }
        if let Some(n) = tiny_size(marker, TINY_MAP) {
            return self.map(n);
        }
        if let Some(n) = tiny_size(marker, TINY_STRUCT) {
            return self.structure(n);
        }

        match marker {
            NULL => Ok(PackStreamValue::Null),
            TRUE => Ok(PackStreamValue::Boolean(true)),
            FALSE => Ok(PackStreamValue::Boolean(false)),
            FLOAT_64 => {
                self.need(8)?;
                Ok(PackStreamValue::Float(self.input.get_f64()))
            }
            INT_8 => {
                self.need(1)?;
                Ok(PackStreamValue::Integer(self.input.get_i8() as i64))
            }
            INT_16 => {
                self.need(2)?;
                Ok(PackStreamValue::Integer(self.input.get_i16() as i64))
            }
            INT_32 => {
                self.need(4)?;
                Ok(PackStreamValue::Integer(self.input.get_i32() as i64))
            }
            INT_64 => {
                self.need(8)?;
                Ok(PackStreamValue::Integer(self.input.get_i64()))
            }
            BYTES_8 | BYTES_16 | BYTES_32 => {
                let n = self.size(marker - BYTES_8)?;
                Ok(PackStreamValue::Bytes(self.take(n)?.to_vec()))
            }
            STRING_8 | STRING_16 | STRING_32 => {
                let n = self.size(marker - STRING_8)?;
                self.string(n)
            }
            LIST_8 | LIST_16 | LIST_32 => {
                let n = self.size(marker - LIST_8)?;
                self.list(n)
            }
            MAP_8 | MAP_16 | MAP_32 => {
                let n = self.size(marker - MAP_8)?;
                self.map(n)
            }
            STRUCT_8 | STRUCT_16 => {
                let n = self.size(marker - STRUCT_8)?;
                self.structure(n)
            }
            other => Err(PackStreamError::UnknownMarker(other)),
        }
    }

    /// Size prefix: `width` 0, 1, 2 selects u8, u16, u32.
    fn size(&mut self, width: u8) -> Result<usize, PackStreamError> {
        Ok(match width {
            0 => self.take_u8()? as usize,
            1 => {
                self.need(2)?;
                self.input.get_u16() as usize
            }
            _ => {
                self.need(4)?;
                self.input.get_u32() as usize
            }
        })
    }

    fn string(&mut self, n: usize) -> Result<PackStreamValue, PackStreamError> {
        let raw = self.take(n)?;
        std::str::from_utf8(raw)
            .map(|s| PackStreamValue::String(s.to_owned()))
            .map_err(|e| PackStreamError::InvalidUtf8(e.to_string()))
    }

    fn list(&mut self, n: usize) -> Result<PackStreamValue, PackStreamError> {
        self.descend()?;
        // Capacity is capped so a hostile length cannot force a huge allocation.
        let mut items = Vec::with_capacity(n.min(self.remaining()));
        for _ in 0..n {
            items.push(self.unpack()?);
        }
        self.depth -= 1;
        Ok(PackStreamValue::List(items))
    }

    fn map(&mut self, n: usize) -> Result<PackStreamValue, PackStreamError> {
        self.descend()?;
        let mut entries = HashMap::with_capacity(n.min(self.remaining()));
        for _ in 0..n {
            let key = match self.unpack()? {
                PackStreamValue::String(k) => k,
                _ => return Err(PackStreamError::InvalidMapKey),
            };
            let value = self.unpack()?;
            entries.insert(key, value);
        }
        self.depth -= 1;
        Ok(PackStreamValue::Map(entries))
    }

    fn structure(&mut self, n: usize) -> Result<PackStreamValue, PackStreamError> {
        self.descend()?;
        let tag = self.take_u8()?;
        let mut fields = Vec::with_capacity(n.min(self.remaining()));
        for _ in 0..n {
            fields.push(self.unpack()?);
        }
        self.depth -= 1;
        Ok(PackStreamValue::Structure(PackStreamStructure::new(tag, fields)))
    }

    fn descend(&mut self) -> Result<(), PackStreamError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(PackStreamError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn need(&self, n: usize) -> Result<(), PackStreamError> {
        if self.input.len() < n {
            Err(PackStreamError::UnexpectedEof)
        } else {
            Ok(())
        }
    }

    fn take_u8(&mut self) -> Result<u8, PackStreamError> {
        self.need(1)?;
        Ok(self.input.get_u8())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PackStreamError> {
        self.need(n)?;
        let (head, tail) = self.input.split_at(n);
        self.input = tail;
        Ok(head)
    }
}

/// Unpacks exactly one value; trailing bytes are an error.
pub fn unpack(input: &[u8]) -> Result<PackStreamValue, PackStreamError> {
    let mut unpacker = Unpacker::new(input);
    let value = unpacker.unpack()?;
    match unpacker.remaining() {
        0 => Ok(value),
        n => Err(PackStreamError::TrailingBytes(n)),
    }
}
