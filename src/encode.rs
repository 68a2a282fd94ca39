//! The encoder: one depth-first walk over a value graph, producing a byte
//! stream.
//!
//! Before anything is written for a value, the identity cache is consulted;
//! a hit appends the precomputed back-reference bytes and nothing else. On a
//! miss the value is admitted at the offset its tag byte is about to occupy,
//! then the tag and payload are emitted, children recursively. Output is
//! append-only. Text payloads (strings, and the ASCII renderings of numbers,
//! big integers, and dates) know their byte length up front, so each header
//! is written exactly once.

use tracing::trace;

use crate::error::{Error, Result};
use crate::marker::Marker;
use crate::memo::Memo;
use crate::options::Options;
use crate::prefix;
use crate::value::{Value, ISO_8601_MILLIS};

/// Encode one value graph with default options.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    encode_with(value, &Options::default())
}

/// Encode one value graph.
///
/// A non-serializable root has no wire representation and yields an empty
/// stream. Non-serializable values inside containers become null (in arrays,
/// where position matters) or are dropped (in records, maps, and sets).
pub fn encode_with(value: &Value, options: &Options) -> Result<Vec<u8>> {
    let mut enc = Encoder {
        buf: Vec::new(),
        memo: Memo::new(options.recursion),
        depth: 0,
        limit: options.max_depth,
    };
    enc.write_value(value)?;
    trace!(bytes = enc.buf.len(), "encoded value graph");
    Ok(enc.buf)
}

struct Encoder {
    buf: Vec<u8>,
    memo: Memo,
    depth: usize,
    limit: usize,
}

impl Encoder {
    fn write_value(&mut self, value: &Value) -> Result<()> {
        if let Some(back) = self.memo.find(value) {
            trace!(at = self.buf.len(), "emitting back-reference");
            self.buf.extend_from_slice(back);
            return Ok(());
        }
        match value {
            Value::Null => self.buf.push(Marker::Null.into()),
            Value::Boolean(v) => {
                self.buf.push(Marker::Boolean.into());
                self.buf.push(*v as u8);
            }
            // NaN and the infinities have no decimal rendering; they degrade
            // to null, and are never admitted to the cache.
            Value::Number(v) if !v.is_finite() => self.buf.push(Marker::Null.into()),
            Value::Number(v) => {
                self.memo.admit(value, self.buf.len());
                self.write_text(Marker::Number, &v.to_string());
            }
            Value::BigInt(v) => {
                self.memo.admit(value, self.buf.len());
                self.write_text(Marker::BigInt, &v.to_string());
            }
            Value::String(v) => {
                self.memo.admit(value, self.buf.len());
                self.write_text(Marker::Str, v);
            }
            Value::Array(cell) => {
                self.memo.admit(value, self.buf.len());
                let elems = cell.borrow();
                prefix::write_header(&mut self.buf, Marker::Array, elems.len() as u64);
                self.descend(|enc| {
                    for elem in elems.iter() {
                        if elem.is_serializable() {
                            enc.write_value(elem)?;
                        } else {
                            // A hole still occupies its index.
                            enc.buf.push(Marker::Null.into());
                        }
                    }
                    Ok(())
                })?;
            }
            Value::Record(cell) => {
                self.memo.admit(value, self.buf.len());
                let live: Vec<_> = cell
                    .borrow()
                    .iter()
                    .filter(|(_, v)| v.is_serializable())
                    .cloned()
                    .collect();
                prefix::write_header(&mut self.buf, Marker::Record, (live.len() * 2) as u64);
                self.descend(|enc| {
                    for (key, val) in &live {
                        enc.write_value(&Value::String(key.clone()))?;
                        enc.write_value(val)?;
                    }
                    Ok(())
                })?;
            }
            Value::Map(cell) => {
                self.memo.admit(value, self.buf.len());
                let live: Vec<_> = cell
                    .borrow()
                    .iter()
                    .filter(|(k, v)| k.is_serializable() && v.is_serializable())
                    .cloned()
                    .collect();
                prefix::write_header(&mut self.buf, Marker::Map, (live.len() * 2) as u64);
                self.descend(|enc| {
                    for (key, val) in &live {
                        enc.write_value(key)?;
                        enc.write_value(val)?;
                    }
                    Ok(())
                })?;
            }
            Value::Set(cell) => {
                self.memo.admit(value, self.buf.len());
                let live: Vec<_> = cell
                    .borrow()
                    .iter()
                    .filter(|v| v.is_serializable())
                    .cloned()
                    .collect();
                prefix::write_header(&mut self.buf, Marker::Set, live.len() as u64);
                self.descend(|enc| {
                    for elem in &live {
                        enc.write_value(elem)?;
                    }
                    Ok(())
                })?;
            }
            Value::Buffer(cell) => {
                self.memo.admit(value, self.buf.len());
                let bytes = cell.borrow();
                prefix::write_header(&mut self.buf, Marker::Buffer, bytes.len() as u64);
                self.buf.extend_from_slice(&bytes);
            }
            Value::Date(at) => {
                self.memo.admit(value, self.buf.len());
                self.write_text(Marker::Date, &at.format(ISO_8601_MILLIS).to_string());
            }
            Value::Regex(re) => {
                self.memo.admit(value, self.buf.len());
                self.buf.push(Marker::Regex.into());
                self.descend(|enc| {
                    enc.write_value(&Value::String(re.source.clone()))?;
                    enc.write_value(&Value::String(re.flags.clone()))
                })?;
            }
            Value::Error(err) => {
                self.memo.admit(value, self.buf.len());
                self.buf.push(Marker::Error.into());
                self.descend(|enc| {
                    enc.write_value(&Value::String(err.name.clone()))?;
                    enc.write_value(&Value::String(err.message.clone()))
                })?;
            }
            Value::View(view) => {
                self.memo.admit(value, self.buf.len());
                self.buf.push(Marker::View.into());
                self.descend(|enc| {
                    enc.write_value(&Value::String(view.kind.clone()))?;
                    enc.write_value(&Value::Buffer(view.buffer.clone()))
                })?;
            }
            Value::Foreign(_) => {
                // Containers drop or null these before dispatch; a bare
                // foreign root has no wire representation.
            }
        }
        Ok(())
    }

    /// Emit a length-prefixed text payload. The ASCII renderings of numbers,
    /// big integers, and dates share this path with general UTF-8 strings;
    /// the byte length is known up front either way.
    fn write_text(&mut self, marker: Marker, text: &str) {
        prefix::write_header(&mut self.buf, marker, text.len() as u64);
        self.buf.extend_from_slice(text.as_bytes());
    }

    /// Run `f` one nesting level deeper, failing once the configured limit is
    /// crossed. This is what turns an untracked cycle (`Recursion::None`)
    /// into an error instead of stack exhaustion.
    fn descend<F: FnOnce(&mut Self) -> Result<()>>(&mut self, f: F) -> Result<()> {
        self.depth += 1;
        if self.depth > self.limit {
            return Err(Error::TooDeep {
                offset: self.buf.len(),
                limit: self.limit,
            });
        }
        let out = f(self);
        self.depth -= 1;
        out
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use super::*;
    use crate::options::Recursion;
    use crate::value::Value;

    #[test]
    fn null_and_booleans() {
        assert_eq!(encode(&Value::Null).unwrap(), [b'n']);
        assert_eq!(encode(&Value::Boolean(true)).unwrap(), [b'b', 1]);
        assert_eq!(encode(&Value::Boolean(false)).unwrap(), [b'b', 0]);
    }

    #[test]
    fn strings() {
        assert_eq!(encode(&Value::from("")).unwrap(), [b's', 0]);
        assert_eq!(encode(&Value::from("hi")).unwrap(), [b's', 1, 2, 0x68, 0x69]);
    }

    #[test]
    fn numbers() {
        assert_eq!(encode(&Value::from(42.0)).unwrap(), [b'N', 1, 2, b'4', b'2']);
        assert_eq!(
            encode(&Value::from(-0.5)).unwrap(),
            [b'N', 1, 4, b'-', b'0', b'.', b'5']
        );
        // Non-finite numbers degrade to null.
        assert_eq!(encode(&Value::Number(f64::NAN)).unwrap(), [b'n']);
        assert_eq!(encode(&Value::Number(f64::INFINITY)).unwrap(), [b'n']);
        assert_eq!(encode(&Value::Number(f64::NEG_INFINITY)).unwrap(), [b'n']);
    }

    #[test]
    fn array_of_numbers() {
        let v = Value::array(vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)]);
        assert_eq!(
            encode(&v).unwrap(),
            [b'A', 1, 3, b'N', 1, 1, b'1', b'N', 1, 1, b'2', b'N', 1, 1, b'3']
        );
    }

    #[test]
    fn bigint_decimal_text() {
        let v = Value::bigint("-123456789012345678901234567890".parse().unwrap());
        let bytes = encode(&v).unwrap();
        assert_eq!(bytes[0], b'I');
        assert_eq!(&bytes[3..], b"-123456789012345678901234567890");
    }

    #[test]
    fn date_layout() {
        let at = "2020-01-02T03:04:05Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap();
        let bytes = encode(&Value::date(at)).unwrap();
        assert_eq!(&bytes[..3], [b'D', 1, 24]);
        assert_eq!(&bytes[3..], b"2020-01-02T03:04:05.000Z");
    }

    #[test]
    fn self_referential_array() {
        let a = Value::array(vec![]);
        if let Value::Array(cell) = &a {
            cell.borrow_mut().push(a.clone());
        }
        assert_eq!(encode(&a).unwrap(), [b'A', 1, 1, b'r', 0]);
    }

    #[test]
    fn diamond_emits_one_copy() {
        let o = Value::record(Vec::<(&str, Value)>::new());
        let r = Value::record(vec![("x", o.clone()), ("y", o)]);
        assert_eq!(
            encode(&r).unwrap(),
            [
                b'O', 1, 4, // two entries
                b's', 1, 1, b'x', b'O', 0, // x: the empty record at offset 7
                b's', 1, 1, b'y', b'r', 1, 7, // y: back-reference to it
            ]
        );
    }

    #[test]
    fn shared_strings_deduplicate_under_all_only() {
        let s: Rc<str> = Rc::from("shared");
        let arr = Value::array(vec![Value::String(s.clone()), Value::String(s)]);

        let all = encode(&arr).unwrap();
        assert_eq!(
            all,
            [b'A', 1, 2, b's', 1, 6, b's', b'h', b'a', b'r', b'e', b'd', b'r', 1, 3]
        );

        let opts = Options {
            recursion: Recursion::Some,
            ..Options::default()
        };
        let some = encode_with(&arr, &opts).unwrap();
        assert_eq!(some.len(), 21);
        // Primitives are not tracked; the body is emitted twice.
        assert_eq!(some[3..12], some[12..21]);
    }

    #[test]
    fn equal_numbers_deduplicate_under_all() {
        let arr = Value::array(vec![Value::from(1.0), Value::from(1.0)]);
        assert_eq!(
            encode(&arr).unwrap(),
            [b'A', 1, 2, b'N', 1, 1, b'1', b'r', 1, 3]
        );
    }

    #[test]
    fn foreign_values() {
        let foreign = Value::Foreign(Rc::new(()));
        // No wire representation at the root.
        assert!(encode(&foreign).unwrap().is_empty());

        // A hole in an array keeps its index.
        let arr = Value::array(vec![Value::from(1.0), foreign.clone()]);
        assert_eq!(encode(&arr).unwrap(), [b'A', 1, 2, b'N', 1, 1, b'1', b'n']);

        // Dropped pairs never reach the record's count.
        let rec = Value::record(vec![("keep", Value::from(1.0)), ("drop", foreign.clone())]);
        assert_eq!(
            encode(&rec).unwrap(),
            [b'O', 1, 2, b's', 1, 4, b'k', b'e', b'e', b'p', b'N', 1, 1, b'1']
        );

        // Dropped from maps when either side is foreign, and from sets.
        let map = Value::map(vec![(foreign.clone(), Value::from(1.0))]);
        assert_eq!(encode(&map).unwrap(), [b'M', 0]);
        let set = Value::set(vec![foreign, Value::Boolean(true)]);
        assert_eq!(encode(&set).unwrap(), [b'S', 1, 1, b'b', 1]);
    }

    #[test]
    fn untracked_cycle_hits_depth_guard() {
        let a = Value::array(vec![]);
        if let Value::Array(cell) = &a {
            cell.borrow_mut().push(a.clone());
        }
        let opts = Options {
            recursion: Recursion::None,
            max_depth: 32,
        };
        let err = encode_with(&a, &opts).unwrap_err();
        assert!(matches!(err, Error::TooDeep { limit: 32, .. }));
    }

    #[test]
    fn regex_and_error_payloads() {
        assert_eq!(
            encode(&Value::regex("a+", "gi")).unwrap(),
            [b'R', b's', 1, 2, b'a', b'+', b's', 1, 2, b'g', b'i']
        );
        assert_eq!(
            encode(&Value::error("TypeError", "nope")).unwrap(),
            [
                b'E', b's', 1, 9, b'T', b'y', b'p', b'e', b'E', b'r', b'r', b'o', b'r', b's', 1, 4,
                b'n', b'o', b'p', b'e'
            ]
        );
    }

    #[test]
    fn view_carries_kind_and_buffer() {
        let buf = Rc::new(std::cell::RefCell::new(vec![1u8, 2, 3]));
        let view = Value::view("Uint8Array", buf);
        assert_eq!(
            encode(&view).unwrap(),
            [
                b'T', b's', 1, 10, b'U', b'i', b'n', b't', b'8', b'A', b'r', b'r', b'a', b'y',
                b'B', 1, 3, 1, 2, 3
            ]
        );
    }
}
