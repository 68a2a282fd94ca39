//! Library error types.

use std::fmt;

/// A tangle-pack Result, normally returning a tangle-pack [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Anything that can go wrong while encoding or decoding a stream. Every
/// variant carries the byte offset at which the problem was detected; nothing
/// is retried internally.
///
/// Encoder-side handling of non-serializable values (null in positional
/// context, dropped in associative context) is a value-level policy, not an
/// error.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The byte at the cursor is not one of the published tag markers.
    UnknownTag {
        /// Offset of the unrecognized byte
        offset: usize,
        /// The byte itself
        tag: u8,
    },
    /// A length prefix declared more payload bytes than remain in the stream.
    BadLength {
        /// Offset of the width byte
        offset: usize,
        /// The declared width
        width: usize,
        /// How many bytes actually remained
        remaining: usize,
    },
    /// A length prefix declared a width beyond the supported maximum of 8.
    WidthTooLarge {
        /// Offset of the width byte
        offset: usize,
        /// The declared width
        width: usize,
    },
    /// A decoded length or offset does not fit in `usize` on this target.
    LengthOverflow {
        /// Offset of the width byte
        offset: usize,
        /// The decoded value
        length: u64,
    },
    /// A boolean payload byte was neither 0 nor 1.
    BadBool {
        /// Offset of the payload byte
        offset: usize,
        /// The byte found there
        value: u8,
    },
    /// Numeric text (a number or big-integer payload) failed to parse.
    BadNumber {
        /// Offset of the value's tag byte
        offset: usize,
        /// The offending text, lossily decoded for display
        text: String,
    },
    /// A string payload was not valid UTF-8.
    BadString {
        /// Offset of the value's tag byte
        offset: usize,
    },
    /// A date payload was not valid ISO-8601 text.
    BadDate {
        /// Offset of the value's tag byte
        offset: usize,
        /// The offending text, lossily decoded for display
        text: String,
    },
    /// A record or map declared an odd payload count; keys and values must
    /// come in pairs.
    OddPairCount {
        /// Offset of the container's tag byte
        offset: usize,
        /// The declared count
        count: u64,
    },
    /// A structured payload held a value of the wrong category, such as a
    /// record key or regex pattern that is not a string.
    WrongElement {
        /// Offset of the offending value's tag byte
        offset: usize,
        /// The category that was required
        expected: &'static str,
        /// The category that was found
        actual: &'static str,
    },
    /// A back-reference targeted an offset at which no value has been
    /// decoded.
    UnresolvedRef {
        /// Offset of the back-reference's tag byte
        offset: usize,
        /// The offset it pointed at
        target: u64,
    },
    /// Container nesting exceeded the configured depth limit.
    TooDeep {
        /// Offset at which the limit was crossed
        offset: usize,
        /// The configured limit
        limit: usize,
    },
    /// The stream ended before a payload could be fully read.
    Truncated {
        /// Offset at which more input was needed
        offset: usize,
        /// How many bytes were needed
        needed: usize,
        /// How many bytes remained
        remaining: usize,
    },
    /// Input continued past the single top-level value. A stream contains
    /// exactly one value; concatenating streams does not produce a stream.
    TrailingBytes {
        /// Offset of the first unconsumed byte
        offset: usize,
        /// How many bytes were left over
        remaining: usize,
    },
}

impl Error {
    /// The byte offset at which this error was detected.
    pub fn offset(&self) -> usize {
        match *self {
            Error::UnknownTag { offset, .. } => offset,
            Error::BadLength { offset, .. } => offset,
            Error::WidthTooLarge { offset, .. } => offset,
            Error::LengthOverflow { offset, .. } => offset,
            Error::BadBool { offset, .. } => offset,
            Error::BadNumber { offset, .. } => offset,
            Error::BadString { offset } => offset,
            Error::BadDate { offset, .. } => offset,
            Error::OddPairCount { offset, .. } => offset,
            Error::WrongElement { offset, .. } => offset,
            Error::UnresolvedRef { offset, .. } => offset,
            Error::TooDeep { offset, .. } => offset,
            Error::Truncated { offset, .. } => offset,
            Error::TrailingBytes { offset, .. } => offset,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::UnknownTag { offset, tag } => {
                write!(f, "Unrecognized tag byte 0x{:02x} at offset {}", tag, offset)
            }
            Error::BadLength {
                offset,
                width,
                remaining,
            } => write!(
                f,
                "Length prefix at offset {} declares {} bytes, but only {} remain",
                offset, width, remaining
            ),
            Error::WidthTooLarge { offset, width } => write!(
                f,
                "Length prefix at offset {} declares width {}, maximum supported is 8",
                offset, width
            ),
            Error::LengthOverflow { offset, length } => write!(
                f,
                "Length {} at offset {} does not fit in usize on this target",
                length, offset
            ),
            Error::BadBool { offset, value } => write!(
                f,
                "Boolean payload at offset {} is {}, expected 0 or 1",
                offset, value
            ),
            Error::BadNumber { offset, ref text } => write!(
                f,
                "Numeric text {:?} at offset {} failed to parse",
                text, offset
            ),
            Error::BadString { offset } => {
                write!(f, "String payload at offset {} is not valid UTF-8", offset)
            }
            Error::BadDate { offset, ref text } => write!(
                f,
                "Date text {:?} at offset {} is not valid ISO-8601",
                text, offset
            ),
            Error::OddPairCount { offset, count } => write!(
                f,
                "Paired container at offset {} declares an odd count of {}",
                offset, count
            ),
            Error::WrongElement {
                offset,
                expected,
                actual,
            } => write!(
                f,
                "Expected a {} at offset {}, but found a {}",
                expected, offset, actual
            ),
            Error::UnresolvedRef { offset, target } => write!(
                f,
                "Back-reference at offset {} targets offset {}, where no value begins",
                offset, target
            ),
            Error::TooDeep { offset, limit } => write!(
                f,
                "Nesting depth limit of {} exceeded at offset {}",
                limit, offset
            ),
            Error::Truncated {
                offset,
                needed,
                remaining,
            } => write!(
                f,
                "Input ended at offset {}: needed {} bytes, {} remain",
                offset, needed, remaining
            ),
            Error::TrailingBytes { offset, remaining } => write!(
                f,
                "Decoding finished at offset {} with {} bytes left over",
                offset, remaining
            ),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn offsets_surface_uniformly() {
        let cases = [
            Error::UnknownTag { offset: 3, tag: 0xff },
            Error::BadBool { offset: 3, value: 2 },
            Error::BadString { offset: 3 },
            Error::TooDeep { offset: 3, limit: 10 },
            Error::TrailingBytes { offset: 3, remaining: 1 },
        ];
        for err in cases {
            assert_eq!(err.offset(), 3);
        }
    }

    #[test]
    fn display_names_the_offset() {
        let err = Error::UnknownTag { offset: 17, tag: 0xff };
        assert!(format!("{}", err).contains("17"));
        let err = Error::Truncated {
            offset: 4,
            needed: 8,
            remaining: 2,
        };
        assert!(format!("{}", err).contains("offset 4"));
    }
}
