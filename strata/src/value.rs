//! Value serialization codec.
//!
//! Values are stored as JSON text. A reserved sentinel string represents an
//! entry that is *present but carries no value*, which is distinct from an
//! absent key:
//!
//! - absent key: the store returns nothing, [`CacheClient::get`] yields `None`
//! - nil entry: the store returns the sentinel, [`decode`] yields [`Decoded::Nil`]
//!
//! JSON-representable values round-trip exactly. Values the codec cannot
//! represent fail with [`CodecError::Encode`]; they are never silently
//! corrupted.
//!
//! [`CacheClient::get`]: crate::client::CacheClient::get
//! [`decode`]: JsonCodec::decode

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Raw representation of a nil entry.
///
/// Not valid JSON, so it can never collide with an encoded value; the
/// collision check in [`JsonCodec::encode`] is a belt-and-braces guard.
pub const NIL_SENTINEL: &str = "__strata:nil__";

/// Error type for codec operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value cannot be represented by the codec.
    #[error("value cannot be encoded: {0}")]
    Encode(#[source] serde_json::Error),

    /// The stored text is not a valid encoding of the requested type.
    #[error("stored value cannot be decoded: {0}")]
    Decode(#[source] serde_json::Error),

    /// The encoded value collides with the reserved nil sentinel.
    #[error("value collides with the reserved nil sentinel `{NIL_SENTINEL}`")]
    ReservedSentinel,
}

/// Result of decoding a raw stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded<T> {
    /// The entry exists but carries no value (nil sentinel).
    Nil,
    /// A regular decoded value.
    Value(T),
}

impl<T> Decoded<T> {
    /// Convert to an `Option`, collapsing [`Decoded::Nil`] to `None`.
    pub fn into_option(self) -> Option<T> {
        match self {
            Decoded::Nil => None,
            Decoded::Value(value) => Some(value),
        }
    }
}

/// JSON codec for cache values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to its raw stored form.
    pub fn encode<T>(&self, value: &T) -> Result<String, CodecError>
    where
        T: Serialize + ?Sized,
    {
        let raw = serde_json::to_string(value).map_err(CodecError::Encode)?;
        if raw == NIL_SENTINEL {
            return Err(CodecError::ReservedSentinel);
        }
        Ok(raw)
    }

    /// Encode the nil entry.
    pub fn encode_nil(&self) -> String {
        NIL_SENTINEL.to_owned()
    }

    /// Decode a raw stored value.
    pub fn decode<T>(&self, raw: &str) -> Result<Decoded<T>, CodecError>
    where
        T: DeserializeOwned,
    {
        if raw == NIL_SENTINEL {
            return Ok(Decoded::Nil);
        }
        serde_json::from_str(raw)
            .map(Decoded::Value)
            .map_err(CodecError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u64,
        name: String,
        tags: Vec<String>,
    }

    #[test]
    fn json_values_round_trip_exactly() {
        let codec = JsonCodec;
        let user = User {
            id: 42,
            name: "ada".into(),
            tags: vec!["admin".into(), "ops".into()],
        };
        let raw = codec.encode(&user).unwrap();
        assert_eq!(codec.decode::<User>(&raw).unwrap(), Decoded::Value(user));
    }

    #[test]
    fn nil_round_trips_and_differs_from_absent() {
        let codec = JsonCodec;
        let raw = codec.encode_nil();
        assert_eq!(codec.decode::<User>(&raw).unwrap(), Decoded::Nil);
        // A JSON string that *contains* the sentinel text is a regular value.
        let quoted = codec.encode(&NIL_SENTINEL).unwrap();
        assert_eq!(
            codec.decode::<String>(&quoted).unwrap(),
            Decoded::Value(NIL_SENTINEL.to_owned())
        );
    }

    #[test]
    fn scalars_and_null_round_trip() {
        let codec = JsonCodec;
        let raw = codec.encode(&serde_json::json!(null)).unwrap();
        assert_eq!(
            codec.decode::<serde_json::Value>(&raw).unwrap(),
            Decoded::Value(serde_json::Value::Null)
        );
        let raw = codec.encode(&7_i64).unwrap();
        assert_eq!(codec.decode::<i64>(&raw).unwrap(), Decoded::Value(7));
    }
}
