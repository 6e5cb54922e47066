//! Tars TLV stream encoding.
//!
//! Every field is written as a head followed by a value. The head packs the
//! field tag and the value type into one byte:
//!
//! ```text
//! tag < 15:   [tag:4 | type:4]
//! tag >= 15:  [0xF:4 | type:4] [tag:8]
//! ```
//!
//! Integers are written with the narrowest type that can hold them (`0` is
//! written as [`ZERO_TAG`] with no value bytes), strings use [`STRING1`] up to
//! 255 bytes and [`STRING4`] beyond, and byte vectors use [`SIMPLE_LIST`].
//! Because the writer is canonical, reading back what it produced yields the
//! same values.
//!
//! Only the subset of types needed for packets and the reporting structs is
//! produced. The reader can still skip floats and doubles so that unknown
//! fields never break decoding.

use std::collections::BTreeMap;

use super::error::{Result, TarsError};

pub const INT8: u8 = 0;
pub const INT16: u8 = 1;
pub const INT32: u8 = 2;
pub const INT64: u8 = 3;
pub const FLOAT: u8 = 4;
pub const DOUBLE: u8 = 5;
pub const STRING1: u8 = 6;
pub const STRING4: u8 = 7;
pub const MAP: u8 = 8;
pub const LIST: u8 = 9;
pub const STRUCT_BEGIN: u8 = 10;
pub const STRUCT_END: u8 = 11;
pub const ZERO_TAG: u8 = 12;
pub const SIMPLE_LIST: u8 = 13;

/// A composite value that can be written into and read from a Tars stream.
///
/// Implementors write their own fields with ascending tags; the enclosing
/// `STRUCT_BEGIN`/`STRUCT_END` markers are handled by the stream.
pub trait TarsStruct: Sized {
    fn write_to(&self, out: &mut TarsStream);
    fn read_from(reader: &mut TarsReader<'_>) -> Result<Self>;
}

/// Growable output buffer for TLV-encoded fields.
#[derive(Debug, Default, Clone)]
pub struct TarsStream {
    buf: Vec<u8>,
}

impl TarsStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stream that starts with `prefix` already in the buffer.
    ///
    /// Used by the packet codec to reserve the frame length header.
    pub fn with_prefix(prefix: &[u8]) -> Self {
        Self {
            buf: prefix.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn write_head(&mut self, tag: u8, ty: u8) {
        if tag < 15 {
            self.buf.push((tag << 4) | ty);
        } else {
            self.buf.push(0xF0 | ty);
            self.buf.push(tag);
        }
    }

    pub fn write_i8(&mut self, tag: u8, value: i8) {
        if value == 0 {
            self.write_head(tag, ZERO_TAG);
        } else {
            self.write_head(tag, INT8);
            self.buf.push(value as u8);
        }
    }

    pub fn write_bool(&mut self, tag: u8, value: bool) {
        self.write_i8(tag, value as i8);
    }

    pub fn write_i16(&mut self, tag: u8, value: i16) {
        if let Ok(narrow) = i8::try_from(value) {
            self.write_i8(tag, narrow);
        } else {
            self.write_head(tag, INT16);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn write_i32(&mut self, tag: u8, value: i32) {
        if let Ok(narrow) = i16::try_from(value) {
            self.write_i16(tag, narrow);
        } else {
            self.write_head(tag, INT32);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn write_i64(&mut self, tag: u8, value: i64) {
        if let Ok(narrow) = i32::try_from(value) {
            self.write_i32(tag, narrow);
        } else {
            self.write_head(tag, INT64);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn write_string(&mut self, tag: u8, value: &str) {
        let bytes = value.as_bytes();
        if let Ok(len) = u8::try_from(bytes.len()) {
            self.write_head(tag, STRING1);
            self.buf.push(len);
        } else {
            self.write_head(tag, STRING4);
            self.buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a `vector<byte>` as a simple list.
    pub fn write_bytes(&mut self, tag: u8, value: &[u8]) {
        self.write_head(tag, SIMPLE_LIST);
        self.write_head(0, INT8);
        self.write_i32(0, value.len() as i32);
        self.buf.extend_from_slice(value);
    }

    pub fn write_string_map(&mut self, tag: u8, value: &BTreeMap<String, String>) {
        self.write_head(tag, MAP);
        self.write_i32(0, value.len() as i32);
        for (k, v) in value {
            self.write_string(0, k);
            self.write_string(1, v);
        }
    }

    pub fn write_struct<T: TarsStruct>(&mut self, tag: u8, value: &T) {
        self.write_head(tag, STRUCT_BEGIN);
        value.write_to(self);
        self.write_head(0, STRUCT_END);
    }

    pub fn write_list<T: TarsStruct>(&mut self, tag: u8, items: &[T]) {
        self.write_head(tag, LIST);
        self.write_i32(0, items.len() as i32);
        for item in items {
            self.write_struct(0, item);
        }
    }

    /// Writes a `map<K, V>` whose keys and values are both structs.
    pub fn write_struct_map<K: TarsStruct, V: TarsStruct>(&mut self, tag: u8, entries: &[(K, V)]) {
        self.write_head(tag, MAP);
        self.write_i32(0, entries.len() as i32);
        for (k, v) in entries {
            self.write_struct(0, k);
            self.write_struct(1, v);
        }
    }
}

/// Cursor over a TLV-encoded buffer.
///
/// Fields must be read in ascending tag order. Fields with tags that are not
/// asked for are skipped; an absent optional field reads as its zero value.
#[derive(Debug)]
pub struct TarsReader<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
}

/// Deepest struct, list or map nesting a reader will enter.
pub const MAX_NESTING_DEPTH: usize = 64;

impl<'a> TarsReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, depth: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                TarsError::Decode(format!(
                    "buffer underflow: need {} bytes at offset {}, have {}",
                    n,
                    self.pos,
                    self.buf.len().saturating_sub(self.pos)
                ))
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Returns `(tag, type, head length)` without consuming it.
    fn peek_head(&self) -> Result<(u8, u8, usize)> {
        let first = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| TarsError::Decode(format!("missing field head at offset {}", self.pos)))?;
        let ty = first & 0x0F;
        let tag = first >> 4;
        if tag == 15 {
            let ext = *self.buf.get(self.pos + 1).ok_or_else(|| {
                TarsError::Decode(format!("truncated extended tag at offset {}", self.pos))
            })?;
            Ok((ext, ty, 2))
        } else {
            Ok((tag, ty, 1))
        }
    }

    fn read_head(&mut self) -> Result<(u8, u8)> {
        let (tag, ty, len) = self.peek_head()?;
        self.pos += len;
        Ok((tag, ty))
    }

    /// Advances to the field with `tag` and consumes its head.
    ///
    /// Returns `None` when the field is absent: the buffer or the enclosing
    /// struct ended, or a field with a larger tag was found first.
    fn skip_to_tag(&mut self, tag: u8) -> Result<Option<u8>> {
        loop {
            if self.is_empty() {
                return Ok(None);
            }
            let (found, ty, len) = self.peek_head()?;
            if ty == STRUCT_END || found > tag {
                return Ok(None);
            }
            self.pos += len;
            if found == tag {
                return Ok(Some(ty));
            }
            self.skip_field(ty)?;
        }
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(TarsError::Decode(format!(
                "nesting too deep at offset {} (limit {})",
                self.pos, MAX_NESTING_DEPTH
            )));
        }
        self.depth += 1;
        Ok(())
    }

    /// Runs `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.enter()?;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn skip_field(&mut self, ty: u8) -> Result<()> {
        match ty {
            MAP | LIST | STRUCT_BEGIN => self.nested(|r| r.skip_container(ty)),
            _ => self.skip_scalar(ty),
        }
    }

    fn skip_container(&mut self, ty: u8) -> Result<()> {
        match ty {
            MAP => {
                let len = self.read_length()?;
                for _ in 0..len * 2 {
                    let (_, ty) = self.read_head()?;
                    self.skip_field(ty)?;
                }
                Ok(())
            }
            LIST => {
                let len = self.read_length()?;
                for _ in 0..len {
                    let (_, ty) = self.read_head()?;
                    self.skip_field(ty)?;
                }
                Ok(())
            }
            _ => self.skip_to_struct_end(),
        }
    }

    fn skip_scalar(&mut self, ty: u8) -> Result<()> {
        match ty {
            INT8 => self.take(1).map(|_| ()),
            INT16 => self.take(2).map(|_| ()),
            INT32 | FLOAT => self.take(4).map(|_| ()),
            INT64 | DOUBLE => self.take(8).map(|_| ()),
            STRING1 => {
                let len = self.take(1)?[0] as usize;
                self.take(len).map(|_| ())
            }
            STRING4 => {
                let len = u32::from_be_bytes(self.take_array()?) as usize;
                self.take(len).map(|_| ())
            }
            STRUCT_END | ZERO_TAG => Ok(()),
            SIMPLE_LIST => {
                let (_, elem) = self.read_head()?;
                if elem != INT8 {
                    return Err(TarsError::Decode(format!(
                        "simple list element type {} is not int8",
                        elem
                    )));
                }
                let len = self.read_length()?;
                self.take(len).map(|_| ())
            }
            other => Err(TarsError::Decode(format!("unknown field type {}", other))),
        }
    }

    fn skip_to_struct_end(&mut self) -> Result<()> {
        loop {
            let (_, ty) = self.read_head()?;
            if ty == STRUCT_END {
                return Ok(());
            }
            self.skip_field(ty)?;
        }
    }

    /// Reads the tag-0 element count that prefixes maps and lists.
    fn read_length(&mut self) -> Result<usize> {
        let len = self.read_i32(0, true)?;
        usize::try_from(len).map_err(|_| TarsError::Decode(format!("negative length {}", len)))
    }

    fn read_int_value(&mut self, ty: u8) -> Result<i64> {
        match ty {
            ZERO_TAG => Ok(0),
            INT8 => Ok(self.take(1)?[0] as i8 as i64),
            INT16 => Ok(i16::from_be_bytes(self.take_array()?) as i64),
            INT32 => Ok(i32::from_be_bytes(self.take_array()?) as i64),
            INT64 => Ok(i64::from_be_bytes(self.take_array()?)),
            other => Err(TarsError::Decode(format!(
                "type mismatch: expected integer, found type {}",
                other
            ))),
        }
    }

    fn missing(tag: u8) -> TarsError {
        TarsError::Decode(format!("required field {} is missing", tag))
    }

    pub fn read_i64(&mut self, tag: u8, required: bool) -> Result<i64> {
        match self.skip_to_tag(tag)? {
            Some(ty) => self.read_int_value(ty),
            None if required => Err(Self::missing(tag)),
            None => Ok(0),
        }
    }

    pub fn read_i32(&mut self, tag: u8, required: bool) -> Result<i32> {
        let value = self.read_i64(tag, required)?;
        i32::try_from(value)
            .map_err(|_| TarsError::Decode(format!("field {} value {} overflows int32", tag, value)))
    }

    pub fn read_i16(&mut self, tag: u8, required: bool) -> Result<i16> {
        let value = self.read_i64(tag, required)?;
        i16::try_from(value)
            .map_err(|_| TarsError::Decode(format!("field {} value {} overflows short", tag, value)))
    }

    pub fn read_i8(&mut self, tag: u8, required: bool) -> Result<i8> {
        let value = self.read_i64(tag, required)?;
        i8::try_from(value)
            .map_err(|_| TarsError::Decode(format!("field {} value {} overflows char", tag, value)))
    }

    pub fn read_bool(&mut self, tag: u8, required: bool) -> Result<bool> {
        Ok(self.read_i8(tag, required)? != 0)
    }

    pub fn read_string(&mut self, tag: u8, required: bool) -> Result<String> {
        let ty = match self.skip_to_tag(tag)? {
            Some(ty) => ty,
            None if required => return Err(Self::missing(tag)),
            None => return Ok(String::new()),
        };
        let len = match ty {
            STRING1 => self.take(1)?[0] as usize,
            STRING4 => u32::from_be_bytes(self.take_array()?) as usize,
            other => {
                return Err(TarsError::Decode(format!(
                    "type mismatch: field {} expected string, found type {}",
                    tag, other
                )))
            }
        };
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| TarsError::Decode(format!("field {} is not valid UTF-8: {}", tag, e)))
    }

    pub fn read_bytes(&mut self, tag: u8, required: bool) -> Result<Vec<u8>> {
        match self.skip_to_tag(tag)? {
            Some(SIMPLE_LIST) => {
                let (_, elem) = self.read_head()?;
                if elem != INT8 {
                    return Err(TarsError::Decode(format!(
                        "field {} simple list element type {} is not int8",
                        tag, elem
                    )));
                }
                let len = self.read_length()?;
                Ok(self.take(len)?.to_vec())
            }
            Some(other) => Err(TarsError::Decode(format!(
                "type mismatch: field {} expected vector<byte>, found type {}",
                tag, other
            ))),
            None if required => Err(Self::missing(tag)),
            None => Ok(Vec::new()),
        }
    }

    pub fn read_string_map(&mut self, tag: u8, required: bool) -> Result<BTreeMap<String, String>> {
        let mut map = BTreeMap::new();
        match self.skip_to_tag(tag)? {
            Some(MAP) => {
                let len = self.read_length()?;
                for _ in 0..len {
                    let k = self.read_string(0, true)?;
                    let v = self.read_string(1, true)?;
                    map.insert(k, v);
                }
                Ok(map)
            }
            Some(other) => Err(TarsError::Decode(format!(
                "type mismatch: field {} expected map, found type {}",
                tag, other
            ))),
            None if required => Err(Self::missing(tag)),
            None => Ok(map),
        }
    }

    /// Reads a struct field. Absent optional structs read as `None`.
    pub fn read_struct<T: TarsStruct>(&mut self, tag: u8, required: bool) -> Result<Option<T>> {
        match self.skip_to_tag(tag)? {
            Some(STRUCT_BEGIN) => self.nested(|r| {
                let value = T::read_from(r)?;
                r.skip_to_struct_end()?;
                Ok(Some(value))
            }),
            Some(other) => Err(TarsError::Decode(format!(
                "type mismatch: field {} expected struct, found type {}",
                tag, other
            ))),
            None if required => Err(Self::missing(tag)),
            None => Ok(None),
        }
    }

    pub fn read_list<T: TarsStruct>(&mut self, tag: u8, required: bool) -> Result<Vec<T>> {
        match self.skip_to_tag(tag)? {
            Some(LIST) => {
                let len = self.read_length()?;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.read_struct(0, true)?.ok_or_else(|| Self::missing(0))?);
                }
                Ok(items)
            }
            Some(other) => Err(TarsError::Decode(format!(
                "type mismatch: field {} expected list, found type {}",
                tag, other
            ))),
            None if required => Err(Self::missing(tag)),
            None => Ok(Vec::new()),
        }
    }

    pub fn read_struct_map<K: TarsStruct, V: TarsStruct>(
        &mut self,
        tag: u8,
        required: bool,
    ) -> Result<Vec<(K, V)>> {
        match self.skip_to_tag(tag)? {
            Some(MAP) => {
                let len = self.read_length()?;
                let mut entries = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    let k = self.read_struct(0, true)?.ok_or_else(|| Self::missing(0))?;
                    let v = self.read_struct(1, true)?.ok_or_else(|| Self::missing(1))?;
                    entries.push((k, v));
                }
                Ok(entries)
            }
            Some(other) => Err(TarsError::Decode(format!(
                "type mismatch: field {} expected map, found type {}",
                tag, other
            ))),
            None if required => Err(Self::missing(tag)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Point {
        x: i32,
        label: String,
    }

    impl TarsStruct for Point {
        fn write_to(&self, out: &mut TarsStream) {
            out.write_i32(0, self.x);
            out.write_string(1, &self.label);
        }

        fn read_from(reader: &mut TarsReader<'_>) -> Result<Self> {
            Ok(Self {
                x: reader.read_i32(0, true)?,
                label: reader.read_string(1, false)?,
            })
        }
    }

    #[test]
    fn test_integers_use_narrowest_type() {
        let mut out = TarsStream::new();
        out.write_i32(1, 0);
        out.write_i32(2, 100);
        out.write_i32(3, 1000);
        out.write_i64(4, 1 << 40);
        assert_eq!(out.as_bytes()[0], (1 << 4) | ZERO_TAG);
        assert_eq!(&out.as_bytes()[1..3], &[(2 << 4) | INT8, 100]);
        assert_eq!(out.as_bytes()[3], (3 << 4) | INT16);
        assert_eq!(out.as_bytes()[6], (4 << 4) | INT64);

        let mut reader = TarsReader::new(out.as_bytes());
        assert_eq!(reader.read_i32(1, true).unwrap(), 0);
        assert_eq!(reader.read_i32(2, true).unwrap(), 100);
        assert_eq!(reader.read_i32(3, true).unwrap(), 1000);
        assert_eq!(reader.read_i64(4, true).unwrap(), 1 << 40);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_extended_tag() {
        let mut out = TarsStream::new();
        out.write_string(200, "far");
        assert_eq!(out.as_bytes()[0], 0xF0 | STRING1);
        assert_eq!(out.as_bytes()[1], 200);

        let mut reader = TarsReader::new(out.as_bytes());
        assert_eq!(reader.read_string(200, true).unwrap(), "far");
    }

    #[test]
    fn test_long_string_uses_string4() {
        let long = "x".repeat(300);
        let mut out = TarsStream::new();
        out.write_string(0, &long);
        assert_eq!(out.as_bytes()[0], STRING4);

        let mut reader = TarsReader::new(out.as_bytes());
        assert_eq!(reader.read_string(0, true).unwrap(), long);
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let mut out = TarsStream::new();
        out.write_i32(1, 7);
        out.write_string(2, "ignored");
        out.write_bytes(3, b"also ignored");
        out.write_i64(4, -42);

        let mut reader = TarsReader::new(out.as_bytes());
        assert_eq!(reader.read_i32(1, true).unwrap(), 7);
        assert_eq!(reader.read_i64(4, true).unwrap(), -42);
    }

    #[test]
    fn test_missing_optional_field_is_zero() {
        let mut out = TarsStream::new();
        out.write_i32(5, 9);

        let mut reader = TarsReader::new(out.as_bytes());
        assert_eq!(reader.read_string(2, false).unwrap(), "");
        assert_eq!(reader.read_i32(5, true).unwrap(), 9);
    }

    #[test]
    fn test_missing_required_field_is_error() {
        let mut reader = TarsReader::new(&[]);
        assert!(reader.read_i32(0, true).is_err());
    }

    #[test]
    fn test_truncated_string_is_error() {
        let mut out = TarsStream::new();
        out.write_string(0, "hello");
        let bytes = &out.as_bytes()[..4];

        let mut reader = TarsReader::new(bytes);
        assert!(matches!(reader.read_string(0, true), Err(TarsError::Decode(_))));
    }

    #[test]
    fn test_type_mismatch_is_error() {
        let mut out = TarsStream::new();
        out.write_string(0, "not a number");

        let mut reader = TarsReader::new(out.as_bytes());
        assert!(reader.read_i32(0, true).is_err());
    }

    #[test]
    fn test_struct_list_and_map() {
        let points = vec![
            Point { x: 1, label: "a".into() },
            Point { x: -300, label: String::new() },
        ];
        let pairs = vec![(Point { x: 2, label: "k".into() }, Point { x: 3, label: "v".into() })];

        let mut out = TarsStream::new();
        out.write_list(1, &points);
        out.write_struct_map(2, &pairs);
        out.write_struct(3, &Point { x: 5, label: "solo".into() });

        let mut reader = TarsReader::new(out.as_bytes());
        assert_eq!(reader.read_list::<Point>(1, true).unwrap(), points);
        assert_eq!(reader.read_struct_map::<Point, Point>(2, true).unwrap(), pairs);
        assert_eq!(
            reader.read_struct::<Point>(3, true).unwrap(),
            Some(Point { x: 5, label: "solo".into() })
        );
    }

    #[test]
    fn test_struct_with_unread_trailing_fields() {
        // A newer peer may append fields the reader does not know about.
        let mut out = TarsStream::new();
        out.write_head(0, STRUCT_BEGIN);
        out.write_i32(0, 11);
        out.write_string(1, "lbl");
        out.write_i64(9, 1 << 40);
        out.write_head(0, STRUCT_END);
        out.write_i32(1, 77);

        let mut reader = TarsReader::new(out.as_bytes());
        let point: Point = reader.read_struct(0, true).unwrap().unwrap();
        assert_eq!(point, Point { x: 11, label: "lbl".into() });
        assert_eq!(reader.read_i32(1, true).unwrap(), 77);
    }

    #[test]
    fn test_negative_length_is_error() {
        let mut out = TarsStream::new();
        out.write_head(0, MAP);
        out.write_i32(0, -1);

        let mut reader = TarsReader::new(out.as_bytes());
        assert!(reader.read_string_map(0, true).is_err());
    }

    fn nested_structs(depth: usize) -> Vec<u8> {
        let mut out = TarsStream::new();
        for _ in 0..depth {
            out.buf.push(STRUCT_BEGIN);
        }
        for _ in 0..depth {
            out.buf.push(STRUCT_END);
        }
        out.write_i32(1, 7);
        out.into_bytes()
    }

    #[test]
    fn test_skips_nesting_within_limit() {
        let bytes = nested_structs(MAX_NESTING_DEPTH);
        assert_eq!(TarsReader::new(&bytes).read_i32(1, true).unwrap(), 7);
    }

    #[test]
    fn test_nesting_past_limit_fails() {
        let bytes = nested_structs(MAX_NESTING_DEPTH + 1);
        let err = TarsReader::new(&bytes).read_i32(1, true).unwrap_err();
        assert!(err.to_string().contains("nesting too deep"));
    }
}
