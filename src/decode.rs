//! The decoder: a single recursive descent over the byte stream.
//!
//! The decoder keeps a table from tag-byte offset to reconstructed value.
//! Containers are built empty and entered into the table *before* their
//! children are decoded, so a back-reference encountered inside a container
//! resolves to the very allocation still being filled. That is the whole
//! trick that makes `root.self = root` round-trip with no fix-up pass. Every
//! other back-referenceable value registers once it is built.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use tracing::trace;

use crate::error::{Error, Result};
use crate::marker::Marker;
use crate::options::Options;
use crate::prefix;
use crate::value::{ErrorValue, RegexValue, SharedBuf, Value, ViewValue};

/// Decode one value graph with default options.
pub fn decode(data: &[u8]) -> Result<Value> {
    decode_with(data, &Options::default())
}

/// Decode one value graph.
///
/// The stream must hold exactly one top-level value; trailing bytes are an
/// error. Only `max_depth` is consulted from the options: the admission
/// policy is an encoder concern, and a decoder resolves whatever
/// back-references the stream contains.
pub fn decode_with(data: &[u8], options: &Options) -> Result<Value> {
    let mut dec = Decoder {
        data,
        pos: 0,
        depth: 0,
        limit: options.max_depth,
        offsets: HashMap::new(),
    };
    let value = dec.read_value()?;
    if dec.pos != data.len() {
        return Err(Error::TrailingBytes {
            offset: dec.pos,
            remaining: data.len() - dec.pos,
        });
    }
    trace!(bytes = data.len(), "decoded value graph");
    Ok(value)
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
    limit: usize,
    /// Tag offset of every decoded back-referenceable value.
    offsets: HashMap<usize, Value>,
}

impl<'a> Decoder<'a> {
    fn read_value(&mut self) -> Result<Value> {
        let offset = self.pos;
        let tag = self.take_byte()?;
        let marker = Marker::from_u8(tag).ok_or(Error::UnknownTag { offset, tag })?;
        let value = match marker {
            Marker::Null => Value::Null,
            Marker::Boolean => {
                let at = self.pos;
                match self.take_byte()? {
                    0 => Value::Boolean(false),
                    1 => Value::Boolean(true),
                    value => return Err(Error::BadBool { offset: at, value }),
                }
            }
            Marker::Number => {
                let text = self.take_text(offset, |offset, text| Error::BadNumber {
                    offset,
                    text,
                })?;
                let n: f64 = text
                    .parse()
                    .map_err(|_| Error::BadNumber {
                        offset,
                        text: text.to_string(),
                    })?;
                Value::Number(n)
            }
            Marker::BigInt => {
                let text = self.take_text(offset, |offset, text| Error::BadNumber {
                    offset,
                    text,
                })?;
                let n: BigInt = text
                    .parse()
                    .map_err(|_| Error::BadNumber {
                        offset,
                        text: text.to_string(),
                    })?;
                Value::BigInt(Rc::new(n))
            }
            Marker::Str => {
                let text = self.take_text(offset, |offset, _| Error::BadString { offset })?;
                Value::String(Rc::from(text))
            }
            Marker::Array => {
                let count = self.read_length()?;
                self.check_count(offset, count)?;
                let cell = Rc::new(RefCell::new(Vec::with_capacity(count)));
                self.offsets.insert(offset, Value::Array(cell.clone()));
                self.descend(offset, |dec| {
                    for _ in 0..count {
                        let elem = dec.read_value()?;
                        cell.borrow_mut().push(elem);
                    }
                    Ok(())
                })?;
                Value::Array(cell)
            }
            Marker::Record => {
                let count = self.read_pair_count(offset)?;
                let cell = Rc::new(RefCell::new(Vec::with_capacity(count)));
                self.offsets.insert(offset, Value::Record(cell.clone()));
                self.descend(offset, |dec| {
                    for _ in 0..count {
                        let key = dec.expect_string()?;
                        let val = dec.read_value()?;
                        cell.borrow_mut().push((key, val));
                    }
                    Ok(())
                })?;
                Value::Record(cell)
            }
            Marker::Map => {
                let count = self.read_pair_count(offset)?;
                let cell = Rc::new(RefCell::new(Vec::with_capacity(count)));
                self.offsets.insert(offset, Value::Map(cell.clone()));
                self.descend(offset, |dec| {
                    for _ in 0..count {
                        let key = dec.read_value()?;
                        let val = dec.read_value()?;
                        cell.borrow_mut().push((key, val));
                    }
                    Ok(())
                })?;
                Value::Map(cell)
            }
            Marker::Set => {
                let count = self.read_length()?;
                self.check_count(offset, count)?;
                let cell = Rc::new(RefCell::new(Vec::with_capacity(count)));
                self.offsets.insert(offset, Value::Set(cell.clone()));
                self.descend(offset, |dec| {
                    for _ in 0..count {
                        let elem = dec.read_value()?;
                        cell.borrow_mut().push(elem);
                    }
                    Ok(())
                })?;
                Value::Set(cell)
            }
            Marker::Buffer => {
                let len = self.read_length()?;
                let bytes = self.take(len)?;
                Value::Buffer(Rc::new(RefCell::new(bytes.to_vec())))
            }
            Marker::Date => {
                let text = self.take_text(offset, |offset, text| Error::BadDate {
                    offset,
                    text,
                })?;
                let at = DateTime::parse_from_rfc3339(text).map_err(|_| Error::BadDate {
                    offset,
                    text: text.to_string(),
                })?;
                Value::Date(Rc::new(at.with_timezone(&Utc)))
            }
            Marker::Regex => {
                let re = self.descend(offset, |dec| {
                    let source = dec.expect_string()?;
                    let flags = dec.expect_string()?;
                    Ok(RegexValue { source, flags })
                })?;
                Value::Regex(Rc::new(re))
            }
            Marker::Error => {
                let err = self.descend(offset, |dec| {
                    let name = dec.expect_string()?;
                    let message = dec.expect_string()?;
                    Ok(ErrorValue { name, message })
                })?;
                Value::Error(Rc::new(err))
            }
            Marker::View => {
                let view = self.descend(offset, |dec| {
                    let kind = dec.expect_string()?;
                    let buffer = dec.expect_buffer()?;
                    Ok(ViewValue { kind, buffer })
                })?;
                Value::View(Rc::new(view))
            }
            Marker::Ref => {
                let (raw, next) = prefix::read_value(self.data, self.pos)?;
                self.pos = next;
                let target = usize::try_from(raw).map_err(|_| Error::LengthOverflow {
                    offset,
                    length: raw,
                })?;
                match self.offsets.get(&target) {
                    Some(v) => v.clone(),
                    None => {
                        return Err(Error::UnresolvedRef {
                            offset,
                            target: raw,
                        })
                    }
                }
            }
        };
        // Null and booleans are never admitted to any encoder's cache, so
        // nothing can legally back-reference them.
        if !matches!(marker, Marker::Null | Marker::Boolean) {
            self.offsets.insert(offset, value.clone());
        }
        Ok(value)
    }

    fn take_byte(&mut self) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or(Error::Truncated {
            offset: self.pos,
            needed: 1,
            remaining: 0,
        })?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let remaining = self.data.len() - self.pos;
        if len > remaining {
            return Err(Error::Truncated {
                offset: self.pos,
                needed: len,
                remaining,
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_length(&mut self) -> Result<usize> {
        let (raw, next) = prefix::read_value(self.data, self.pos)?;
        let len = usize::try_from(raw).map_err(|_| Error::LengthOverflow {
            offset: self.pos,
            length: raw,
        })?;
        self.pos = next;
        Ok(len)
    }

    /// Read a record/map payload count, which declares 2·K and must be even.
    fn read_pair_count(&mut self, offset: usize) -> Result<usize> {
        let declared = self.read_length()?;
        if declared % 2 != 0 {
            return Err(Error::OddPairCount {
                offset,
                count: declared as u64,
            });
        }
        self.check_count(offset, declared)?;
        Ok(declared / 2)
    }

    /// Reject a declared child count that cannot possibly fit in the
    /// remaining input (every value takes at least one byte), before any
    /// allocation is sized from it.
    fn check_count(&self, offset: usize, count: usize) -> Result<()> {
        let remaining = self.data.len() - self.pos;
        if count > remaining {
            return Err(Error::Truncated {
                offset,
                needed: count,
                remaining,
            });
        }
        Ok(())
    }

    /// Read a length-prefixed text payload, mapping both UTF-8 and parse
    /// framing problems through `err` with the payload lossily rendered.
    fn take_text(
        &mut self,
        offset: usize,
        err: fn(usize, String) -> Error,
    ) -> Result<&'a str> {
        let len = self.read_length()?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map_err(|_| err(offset, String::from_utf8_lossy(bytes).into_owned()))
    }

    /// Decode the next value and require a string; back-references to an
    /// earlier string satisfy this.
    fn expect_string(&mut self) -> Result<Rc<str>> {
        let at = self.pos;
        match self.read_value()? {
            Value::String(s) => Ok(s),
            other => Err(Error::WrongElement {
                offset: at,
                expected: "string",
                actual: other.kind(),
            }),
        }
    }

    /// Decode the next value and require a buffer; back-references to an
    /// earlier buffer satisfy this.
    fn expect_buffer(&mut self) -> Result<SharedBuf> {
        let at = self.pos;
        match self.read_value()? {
            Value::Buffer(b) => Ok(b),
            other => Err(Error::WrongElement {
                offset: at,
                expected: "buffer",
                actual: other.kind(),
            }),
        }
    }

    /// Run `f` one nesting level deeper, failing once the configured limit is
    /// crossed.
    fn descend<R, F: FnOnce(&mut Self) -> Result<R>>(&mut self, offset: usize, f: F) -> Result<R> {
        self.depth += 1;
        if self.depth > self.limit {
            return Err(Error::TooDeep {
                offset,
                limit: self.limit,
            });
        }
        let out = f(self);
        self.depth -= 1;
        out
    }
}
