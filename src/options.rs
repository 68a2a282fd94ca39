//! Codec configuration.

use serde::{Deserialize, Serialize};

use crate::DEFAULT_MAX_DEPTH;

/// Admission policy for the encoder's identity cache: which values are
/// tracked so a repeat occurrence becomes a back-reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recursion {
    /// Track containers, object-like values, and non-empty primitives
    /// (strings, finite numbers, big integers). Shared primitives
    /// deduplicate on the wire.
    All,
    /// Track only containers and object-like values. Primitives are emitted
    /// in full at every occurrence, but cyclic structure still round-trips.
    Some,
    /// Track nothing. Cheapest for graphs known to be trees; encoding a
    /// cyclic graph under this policy fails with the nesting-depth error.
    None,
}

/// Options accepted by [`encode_with`](crate::encode_with) and
/// [`decode_with`](crate::decode_with).
///
/// The serde representation ignores unknown fields, so configuration stored
/// by a newer release still deserializes here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Identity-cache admission policy. Default: [`Recursion::All`].
    pub recursion: Recursion,
    /// Maximum container nesting depth for both encoding and decoding.
    /// Default: [`DEFAULT_MAX_DEPTH`].
    pub max_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            recursion: Recursion::All,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let opts = Options::default();
        assert_eq!(opts.recursion, Recursion::All);
        assert_eq!(opts.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn unknown_fields_ignored() {
        let opts: Options =
            serde_json::from_str(r#"{"recursion":"some","future_knob":true}"#).unwrap();
        assert_eq!(opts.recursion, Recursion::Some);
        assert_eq!(opts.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn recursion_names_are_lowercase() {
        assert_eq!(serde_json::to_string(&Recursion::All).unwrap(), r#""all""#);
        assert_eq!(serde_json::to_string(&Recursion::None).unwrap(), r#""none""#);
    }
}
