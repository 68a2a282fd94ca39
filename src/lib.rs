//! tangle-pack is a compact binary codec for dynamic value graphs (numbers,
//! strings, booleans, null, big integers, arrays, records, maps, sets, dates,
//! regular expressions, errors, typed byte views, and raw buffers) that
//! preserves reference identity. When two paths in a graph reach the same
//! allocation, the second occurrence is written as a back-reference to the
//! byte offset where the first began, so diamonds collapse on the wire and
//! cyclic graphs round-trip exactly.
//!
//! Every value starts with a one-byte tag (the ASCII mnemonics documented on
//! [`Marker`]), followed by a length prefix where needed: one width byte and
//! that many big-endian bytes. Streams carry exactly one top-level value and
//! no header or trailer.
//!
//! ```
//! use tangle_pack::{decode, encode, Value};
//!
//! let point = Value::record(vec![
//!     ("x", Value::from(1.0)),
//!     ("y", Value::from(2.0)),
//! ]);
//! // The same record twice: the second occurrence becomes a back-reference.
//! let path = Value::array(vec![point.clone(), point]);
//!
//! let bytes = encode(&path).unwrap();
//! let back = decode(&bytes).unwrap();
//! assert!(path.deep_eq(&back));
//!
//! // Decoding rebuilt the sharing, not just the shape.
//! let items = back.as_array().unwrap().borrow();
//! assert!(items[0].same_ref(&items[1]));
//! ```
//!
//! Cycles need no extra ceremony:
//!
//! ```
//! use tangle_pack::{decode, encode, Value};
//!
//! let a = Value::array(vec![]);
//! if let Value::Array(cell) = &a {
//!     cell.borrow_mut().push(a.clone());
//! }
//! let back = decode(&encode(&a).unwrap()).unwrap();
//! let items = back.as_array().unwrap().borrow();
//! assert!(items[0].same_ref(&back));
//! ```
//!
//! How aggressively repeat values are tracked is governed by
//! [`Recursion`]: `All` (the default) also deduplicates shared strings,
//! numbers, and big integers; `Some` tracks only containers and object-like
//! values; `None` tracks nothing and is for graphs known to be trees.
//!
//! Values hold `Rc` handles and are single-threaded by design; each encode
//! and decode is synchronous and owns all of its working state.

mod decode;
mod encode;
mod error;
mod marker;
mod memo;
mod options;
mod prefix;
mod value;

pub use decode::{decode, decode_with};
pub use encode::{encode, encode_with};
pub use error::{Error, Result};
pub use marker::Marker;
pub use options::{Options, Recursion};
pub use value::{
    ErrorValue, RegexValue, SharedBuf, SharedEntries, SharedPairs, SharedVec, Value, ViewValue,
};

/// Default maximum container nesting depth for both encoding and decoding.
/// Override through [`Options::max_depth`].
pub const DEFAULT_MAX_DEPTH: usize = 10_000;

/// Maximum supported width in bytes of a length prefix. Eight big-endian
/// bytes carry any `u64` length or stream offset.
pub const MAX_LEN_WIDTH: usize = 8;
