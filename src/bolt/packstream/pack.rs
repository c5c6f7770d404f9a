//! Serialization of [`PackStreamValue`]s.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};

use super::marker::*;
use super::value::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Writes packed values into a growable buffer.
///
/// Sizes are always emitted in their narrowest form, so packing is
/// deterministic for everything except map entry order.
pub struct Packer<'a> {
    out: &'a mut BytesMut,
}

impl<'a> Packer<'a> {
    pub fn new(out: &'a mut BytesMut) -> Self {
        Self { out }
    }

    pub fn pack(&mut self, value: &PackStreamValue) -> Result<(), PackStreamError> {
        match value {
            PackStreamValue::Null => self.out.put_u8(NULL),
            PackStreamValue::Boolean(b) => self.out.put_u8(if *b { TRUE } else { FALSE }),
            PackStreamValue::Integer(i) => self.pack_int(*i),
            PackStreamValue::Float(f) => {
                self.out.put_u8(FLOAT_64);
                self.out.put_f64(*f);
            }
            PackStreamValue::Bytes(b) => self.pack_bytes(b)?,
            PackStreamValue::String(s) => self.pack_string(s)?,
            PackStreamValue::List(items) => self.pack_list(items)?,
            PackStreamValue::Map(entries) => self.pack_map(entries)?,
            PackStreamValue::Structure(s) => self.pack_structure(s)?,
        }
        Ok(())
    }

    pub fn pack_int(&mut self, v: i64) {
        if TINY_INT_RANGE.contains(&v) {
            self.out.put_i8(v as i8);
        } else if let Ok(v) = i8::try_from(v) {
            self.out.put_u8(INT_8);
            self.out.put_i8(v);
        } else if let Ok(v) = i16::try_from(v) {
            self.out.put_u8(INT_16);
            self.out.put_i16(v);
        } else if let Ok(v) = i32::try_from(v) {
            self.out.put_u8(INT_32);
            self.out.put_i32(v);
        } else {
            self.out.put_u8(INT_64);
            self.out.put_i64(v);
        }
    }

    pub fn pack_bytes(&mut self, b: &[u8]) -> Result<(), PackStreamError> {
        // Byte arrays have no tiny form.
        match b.len() {
            n if n <= u8::MAX as usize => {
                self.out.put_u8(BYTES_8);
                self.out.put_u8(n as u8);
            }
            n if n <= u16::MAX as usize => {
                self.out.put_u8(BYTES_16);
                self.out.put_u16(n as u16);
            }
            n if n <= u32::MAX as usize => {
                self.out.put_u8(BYTES_32);
                self.out.put_u32(n as u32);
            }
            n => return Err(PackStreamError::ValueTooLarge("bytes", n)),
        }
        self.out.put_slice(b);
        Ok(())
    }

    pub fn pack_string(&mut self, s: &str) -> Result<(), PackStreamError> {
        self.header("string", s.len(), TINY_STRING, [STRING_8, STRING_16, STRING_32])?;
        self.out.put_slice(s.as_bytes());
        Ok(())
    }

    pub fn pack_list(&mut self, items: &[PackStreamValue]) -> Result<(), PackStreamError> {
        self.header("list", items.len(), TINY_LIST, [LIST_8, LIST_16, LIST_32])?;
        items.iter().try_for_each(|item| self.pack(item))
    }

    pub fn pack_map(&mut self, entries: &HashMap<String, PackStreamValue>) -> Result<(), PackStreamError> {
        self.header("map", entries.len(), TINY_MAP, [MAP_8, MAP_16, MAP_32])?;
        for (key, value) in entries {
            self.pack_string(key)?;
            self.pack(value)?;
        }
        Ok(())
    }

    pub fn pack_structure(&mut self, s: &PackStreamStructure) -> Result<(), PackStreamError> {
        match s.fields.len() {
            n if n <= TINY_MAX => self.out.put_u8(TINY_STRUCT | n as u8),
            n if n <= u8::MAX as usize => {
                self.out.put_u8(STRUCT_8);
                self.out.put_u8(n as u8);
            }
            n if n <= u16::MAX as usize => {
                self.out.put_u8(STRUCT_16);
                self.out.put_u16(n as u16);
            }
            n => return Err(PackStreamError::ValueTooLarge("structure", n)),
        }
        self.out.put_u8(s.tag);
        s.fields.iter().try_for_each(|field| self.pack(field))
    }

    /// Size header shared by strings, lists and maps.
    fn header(
        &mut self,
        what: &'static str,
        len: usize,
        tiny: u8,
        [m8, m16, m32]: [u8; 3],
    ) -> Result<(), PackStreamError> {
        if len <= TINY_MAX {
            self.out.put_u8(tiny | len as u8);
        } else if len <= u8::MAX as usize {
            self.out.put_u8(m8);
            self.out.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.out.put_u8(m16);
            self.out.put_u16(len as u16);
        } else if len <= u32::MAX as usize {
            self.out.put_u8(m32);
            self.out.put_u32(len as u32);
        } else {
            return Err(PackStreamError::ValueTooLarge(what, len));
        }
        Ok(())
    }
}

/// Packs one value into a fresh buffer.
pub fn pack(value: &PackStreamValue) -> Result<BytesMut, PackStreamError> {
    let mut out = BytesMut::with_capacity(128);
    Packer::new(&mut out).pack(value)?;
    Ok(out)
}
