//! The value universe the codec operates on.
//!
//! Containers and object-like leaves sit behind `Rc`, so a value is a handle
//! into a graph rather than a tree: cloning is cheap, two paths can reach the
//! same allocation, and a container can (directly or transitively) contain
//! itself. The encoder keys its identity cache on these allocations, and the
//! decoder reconstructs the same sharing. Because the graph may be cyclic,
//! `Value` implements neither `PartialEq` nor a derived `Debug`; use
//! [`Value::deep_eq`] for structural comparison and the hand-written `Debug`
//! below, both of which terminate on cycles.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use num_bigint::BigInt;

/// Shared storage for array and set elements.
pub type SharedVec = Rc<RefCell<Vec<Value>>>;
/// Shared storage for record entries, in host iteration order.
pub type SharedEntries = Rc<RefCell<Vec<(Rc<str>, Value)>>>;
/// Shared storage for map entries. A `Vec` of pairs rather than a hash or
/// tree map, because keys may be values (such as floats) that implement
/// neither `Ord` nor `Hash`.
pub type SharedPairs = Rc<RefCell<Vec<(Value, Value)>>>;
/// Shared storage for raw byte buffers.
pub type SharedBuf = Rc<RefCell<Vec<u8>>>;

/// The date rendering used on the wire: ISO-8601 with millisecond precision
/// and a literal `Z`. Sub-millisecond precision is not preserved.
pub(crate) const ISO_8601_MILLIS: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// A regular expression value: a pattern and its flags, both strings. The
/// codec carries them verbatim and never compiles the pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct RegexValue {
    pub source: Rc<str>,
    pub flags: Rc<str>,
}

/// An error value: a class name and a message. Stack traces are not carried.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorValue {
    pub name: Rc<str>,
    pub message: Rc<str>,
}

/// A typed view over a byte buffer, such as `"Uint8Array"` or `"DataView"`.
/// The kind tag is a free-form discriminator supplied by whoever built the
/// value; only the underlying buffer's bytes are carried, not a sub-range.
#[derive(Clone, Debug)]
pub struct ViewValue {
    pub kind: Rc<str>,
    pub buffer: SharedBuf,
}

/// A value in the serializable universe, plus [`Foreign`](Value::Foreign)
/// for host data the codec cannot carry.
#[derive(Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    /// A double-precision number. Non-finite values degrade to null on the
    /// wire.
    Number(f64),
    BigInt(Rc<BigInt>),
    String(Rc<str>),
    Array(SharedVec),
    /// A plain record: string keys in insertion order.
    Record(SharedEntries),
    /// A map: arbitrary keys in insertion order.
    Map(SharedPairs),
    Set(SharedVec),
    Buffer(SharedBuf),
    Date(Rc<DateTime<Utc>>),
    Regex(Rc<RegexValue>),
    Error(Rc<ErrorValue>),
    View(Rc<ViewValue>),
    /// Host data with no wire representation (callable, symbolic, absent).
    /// Encoders emit null for it in positional context and drop it in
    /// associative context.
    Foreign(Rc<dyn Any>),
}

impl Value {
    /// The value's category name. Useful for error messages.
    pub fn kind(&self) -> &'static str {
        match *self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Buffer(_) => "buffer",
            Value::Date(_) => "date",
            Value::Regex(_) => "regexp",
            Value::Error(_) => "error",
            Value::View(_) => "typed_view",
            Value::Foreign(_) => "foreign",
        }
    }

    /// Whether the value has a wire representation of its own.
    pub fn is_serializable(&self) -> bool {
        !matches!(self, Value::Foreign(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn array(elems: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elems)))
    }

    pub fn set(elems: Vec<Value>) -> Self {
        Value::Set(Rc::new(RefCell::new(elems)))
    }

    pub fn record<K: Into<Rc<str>>>(entries: Vec<(K, Value)>) -> Self {
        let entries = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Value::Record(Rc::new(RefCell::new(entries)))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn buffer(bytes: Vec<u8>) -> Self {
        Value::Buffer(Rc::new(RefCell::new(bytes)))
    }

    pub fn date(at: DateTime<Utc>) -> Self {
        Value::Date(Rc::new(at))
    }

    pub fn regex(source: &str, flags: &str) -> Self {
        Value::Regex(Rc::new(RegexValue {
            source: Rc::from(source),
            flags: Rc::from(flags),
        }))
    }

    pub fn error(name: &str, message: &str) -> Self {
        Value::Error(Rc::new(ErrorValue {
            name: Rc::from(name),
            message: Rc::from(message),
        }))
    }

    pub fn view(kind: &str, buffer: SharedBuf) -> Self {
        Value::View(Rc::new(ViewValue {
            kind: Rc::from(kind),
            buffer,
        }))
    }

    pub fn bigint(v: BigInt) -> Self {
        Value::BigInt(Rc::new(v))
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Boolean(v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        if let Value::Number(v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_bigint(&self) -> Option<&BigInt> {
        if let Value::BigInt(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_array(&self) -> Option<&SharedVec> {
        if let Value::Array(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_record(&self) -> Option<&SharedEntries> {
        if let Value::Record(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_map(&self) -> Option<&SharedPairs> {
        if let Value::Map(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_set(&self) -> Option<&SharedVec> {
        if let Value::Set(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_buffer(&self) -> Option<&SharedBuf> {
        if let Value::Buffer(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        if let Value::Date(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    /// Whether two values are the same host reference: the same allocation,
    /// not merely equal content. Always false for null, booleans, and
    /// numbers, which carry no allocation.
    pub fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::BigInt(a), Value::BigInt(b)) => Rc::ptr_eq(a, b),
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Record(a), Value::Record(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::Buffer(a), Value::Buffer(b)) => Rc::ptr_eq(a, b),
            (Value::Date(a), Value::Date(b)) => Rc::ptr_eq(a, b),
            (Value::Regex(a), Value::Regex(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            (Value::View(a), Value::View(b)) => Rc::ptr_eq(a, b),
            (Value::Foreign(a), Value::Foreign(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Structural equality over the whole graph. Shared and cyclic structure
    /// is compared pairwise: once a pair of containers has been visited, the
    /// pair is assumed equal, which makes the walk terminate on cycles.
    /// Numbers compare by bit pattern, so NaN equals NaN and `0.0` differs
    /// from `-0.0`, mirroring the identity the encoder uses.
    pub fn deep_eq(&self, other: &Value) -> bool {
        deep_eq_at(self, other, &mut HashSet::new())
    }
}

fn pair_key<T: ?Sized, U: ?Sized>(a: *const T, b: *const U) -> (usize, usize) {
    (a as *const () as usize, b as *const () as usize)
}

fn deep_eq_at(a: &Value, b: &Value, seen: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x.to_bits() == y.to_bits(),
        (Value::BigInt(x), Value::BigInt(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) | (Value::Set(x), Value::Set(y)) => {
            if !seen.insert(pair_key(Rc::as_ptr(x), Rc::as_ptr(y))) {
                return true;
            }
            let xs = x.borrow();
            let ys = y.borrow();
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|(u, v)| deep_eq_at(u, v, seen))
        }
        (Value::Record(x), Value::Record(y)) => {
            if !seen.insert(pair_key(Rc::as_ptr(x), Rc::as_ptr(y))) {
                return true;
            }
            let xs = x.borrow();
            let ys = y.borrow();
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && deep_eq_at(va, vb, seen))
        }
        (Value::Map(x), Value::Map(y)) => {
            if !seen.insert(pair_key(Rc::as_ptr(x), Rc::as_ptr(y))) {
                return true;
            }
            let xs = x.borrow();
            let ys = y.borrow();
            xs.len() == ys.len()
                && xs.iter().zip(ys.iter()).all(|((ka, va), (kb, vb))| {
                    deep_eq_at(ka, kb, seen) && deep_eq_at(va, vb, seen)
                })
        }
        (Value::Buffer(x), Value::Buffer(y)) => *x.borrow() == *y.borrow(),
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::Regex(x), Value::Regex(y)) => x == y,
        (Value::Error(x), Value::Error(y)) => x == y,
        (Value::View(x), Value::View(y)) => {
            x.kind == y.kind && *x.buffer.borrow() == *y.buffer.borrow()
        }
        (Value::Foreign(x), Value::Foreign(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_graph(self, f, &mut HashSet::new())
    }
}

fn fmt_graph(v: &Value, f: &mut fmt::Formatter<'_>, seen: &mut HashSet<usize>) -> fmt::Result {
    match v {
        Value::Null => f.write_str("Null"),
        Value::Boolean(b) => write!(f, "Boolean({})", b),
        Value::Number(n) => write!(f, "Number({})", n),
        Value::BigInt(i) => write!(f, "BigInt({})", i),
        Value::String(s) => write!(f, "String({:?})", &**s),
        Value::Array(cell) => fmt_elems("Array", &cell.borrow(), Rc::as_ptr(cell) as usize, f, seen),
        Value::Set(cell) => fmt_elems("Set", &cell.borrow(), Rc::as_ptr(cell) as usize, f, seen),
        Value::Record(cell) => {
            if !seen.insert(Rc::as_ptr(cell) as usize) {
                return f.write_str("Record(<cycle>)");
            }
            f.write_str("Record({")?;
            for (i, (key, val)) in cell.borrow().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{:?}: ", &**key)?;
                fmt_graph(val, f, seen)?;
            }
            f.write_str("})")
        }
        Value::Map(cell) => {
            if !seen.insert(Rc::as_ptr(cell) as usize) {
                return f.write_str("Map(<cycle>)");
            }
            f.write_str("Map({")?;
            for (i, (key, val)) in cell.borrow().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                fmt_graph(key, f, seen)?;
                f.write_str(" => ")?;
                fmt_graph(val, f, seen)?;
            }
            f.write_str("})")
        }
        Value::Buffer(cell) => write!(f, "Buffer({} bytes)", cell.borrow().len()),
        Value::Date(at) => write!(f, "Date({})", at.format(ISO_8601_MILLIS)),
        Value::Regex(re) => write!(f, "Regex(/{}/{})", re.source, re.flags),
        Value::Error(err) => write!(f, "Error({}: {})", err.name, err.message),
        Value::View(view) => write!(f, "View({}, {} bytes)", view.kind, view.buffer.borrow().len()),
        Value::Foreign(_) => f.write_str("Foreign"),
    }
}

fn fmt_elems(
    name: &str,
    elems: &[Value],
    addr: usize,
    f: &mut fmt::Formatter<'_>,
    seen: &mut HashSet<usize>,
) -> fmt::Result {
    if !seen.insert(addr) {
        return write!(f, "{}(<cycle>)", name);
    }
    write!(f, "{}([", name)?;
    for (i, elem) in elems.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        fmt_graph(elem, f, seen)?;
    }
    f.write_str("])")
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::String(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::String(Rc::from(v.as_str()))
    }
}

impl From<BigInt> for Value {
    fn from(v: BigInt) -> Value {
        Value::BigInt(Rc::new(v))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cyclic_array() -> Value {
        let a = Value::array(vec![]);
        if let Value::Array(cell) = &a {
            cell.borrow_mut().push(a.clone());
        }
        a
    }

    #[test]
    fn kinds() {
        assert_eq!(Value::Null.kind(), "null");
        assert_eq!(Value::from(1.0).kind(), "number");
        assert_eq!(Value::regex("a+", "gi").kind(), "regexp");
        assert_eq!(Value::view("Uint8Array", Rc::new(RefCell::new(vec![]))).kind(), "typed_view");
        assert_eq!(Value::Foreign(Rc::new(())).kind(), "foreign");
    }

    #[test]
    fn deep_eq_primitives() {
        assert!(Value::from(1.5).deep_eq(&Value::from(1.5)));
        assert!(!Value::from(0.0).deep_eq(&Value::from(-0.0)));
        assert!(Value::Number(f64::NAN).deep_eq(&Value::Number(f64::NAN)));
        assert!(Value::from("a").deep_eq(&Value::from("a")));
        assert!(!Value::from("a").deep_eq(&Value::from("b")));
        assert!(!Value::from("1").deep_eq(&Value::from(1.0)));
    }

    #[test]
    fn deep_eq_containers() {
        let a = Value::record(vec![("x", Value::from(1.0)), ("y", Value::Null)]);
        let b = Value::record(vec![("x", Value::from(1.0)), ("y", Value::Null)]);
        let c = Value::record(vec![("y", Value::Null), ("x", Value::from(1.0))]);
        assert!(a.deep_eq(&b));
        // Entry order is part of a record's structure.
        assert!(!a.deep_eq(&c));
    }

    #[test]
    fn deep_eq_terminates_on_cycles() {
        let a = cyclic_array();
        let b = cyclic_array();
        assert!(a.deep_eq(&b));
        assert!(a.deep_eq(&a.clone()));
    }

    #[test]
    fn same_ref_is_identity_not_equality() {
        let shared: Rc<str> = Rc::from("dup");
        let a = Value::String(shared.clone());
        let b = Value::String(shared);
        let c = Value::from("dup");
        assert!(a.same_ref(&b));
        assert!(!a.same_ref(&c));
        assert!(a.deep_eq(&c));
        assert!(!Value::from(1.0).same_ref(&Value::from(1.0)));
    }

    #[test]
    fn debug_marks_cycles() {
        let printed = format!("{:?}", cyclic_array());
        assert_eq!(printed, "Array([Array(<cycle>)])");
    }

    #[test]
    fn debug_prints_leaves() {
        let v = Value::record(vec![("n", Value::from(2.0)), ("s", Value::from("hi"))]);
        assert_eq!(printed(&v), r#"Record({"n": Number(2), "s": String("hi")})"#);
    }

    fn printed(v: &Value) -> String {
        format!("{:?}", v)
    }
}
