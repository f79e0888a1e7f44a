//! Conversion between entities and their wire representation.

use crate::error::{CoreResult, Failure};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Converts entities to and from the JSON wire representation.
///
/// The codec is supplied when a repository is constructed. Encoding then
/// decoding must be lossless for every field the entity declares.
pub trait WireCodec<E>: Send + Sync {
    /// Encodes an entity.
    ///
    /// # Errors
    ///
    /// Returns [`Failure::Unexpected`] if the entity cannot be represented.
    fn encode(&self, entity: &E) -> CoreResult<Value>;

    /// Decodes an entity.
    ///
    /// # Errors
    ///
    /// Returns [`Failure::Unexpected`] if the value has the wrong shape.
    fn decode(&self, value: Value) -> CoreResult<E>;
}

impl<E, C: WireCodec<E> + ?Sized> WireCodec<E> for Arc<C> {
    fn encode(&self, entity: &E) -> CoreResult<Value> {
        (**self).encode(entity)
    }

    fn decode(&self, value: Value) -> CoreResult<E> {
        (**self).decode(value)
    }
}

/// Codec backed by the entity's serde implementation.
pub struct JsonCodec<E>(PhantomData<fn() -> E>);

impl<E> JsonCodec<E> {
    /// Creates the codec.
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<E> Default for JsonCodec<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for JsonCodec<E> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for JsonCodec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<E: Serialize + DeserializeOwned> WireCodec<E> for JsonCodec<E> {
    fn encode(&self, entity: &E) -> CoreResult<Value> {
        serde_json::to_value(entity)
            .map_err(|e| Failure::unexpected(format!("encode failed: {e}")).with_code("encode"))
    }

    fn decode(&self, value: Value) -> CoreResult<E> {
        serde_json::from_value(value)
            .map_err(|e| Failure::unexpected(format!("decode failed: {e}")).with_code("decode"))
    }
}

type EncodeFn<E> = dyn Fn(&E) -> CoreResult<Value> + Send + Sync;
type DecodeFn<E> = dyn Fn(Value) -> CoreResult<E> + Send + Sync;

/// Codec built from two explicit conversion functions.
///
/// Useful when the wire shape differs from the entity's own serde form.
pub struct FnCodec<E> {
    encode: Box<EncodeFn<E>>,
    decode: Box<DecodeFn<E>>,
}

impl<E> FnCodec<E> {
    /// Creates a codec from conversion functions.
    pub fn new(
        encode: impl Fn(&E) -> CoreResult<Value> + Send + Sync + 'static,
        decode: impl Fn(Value) -> CoreResult<E> + Send + Sync + 'static,
    ) -> Self {
        Self {
            encode: Box::new(encode),
            decode: Box::new(decode),
        }
    }
}

impl<E> fmt::Debug for FnCodec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnCodec")
    }
}

impl<E> WireCodec<E> for FnCodec<E> {
    fn encode(&self, entity: &E) -> CoreResult<Value> {
        (self.encode)(entity)
    }

    fn decode(&self, value: Value) -> CoreResult<E> {
        (self.decode)(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tag {
        id: u32,
        label: String,
    }

    #[test]
    fn json_codec_is_lossless() {
        let codec = JsonCodec::<Tag>::new();
        let tag = Tag {
            id: 4,
            label: "urgent".into(),
        };
        let wire = codec.encode(&tag).unwrap();
        assert_eq!(wire, json!({"id": 4, "label": "urgent"}));
        assert_eq!(codec.decode(wire).unwrap(), tag);
    }

    #[test]
    fn json_codec_rejects_wrong_shape() {
        let codec = JsonCodec::<Tag>::new();
        let err = codec.decode(json!({"id": "four"})).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unexpected);
        assert_eq!(err.code(), Some("decode"));
    }

    #[test]
    fn fn_codec_uses_supplied_conversions() {
        let codec = FnCodec::new(
            |tag: &Tag| Ok(json!([tag.id, tag.label])),
            |value: Value| {
                let id = value[0]
                    .as_u64()
                    .ok_or_else(|| Failure::unexpected("missing id"))?;
                let label = value[1]
                    .as_str()
                    .ok_or_else(|| Failure::unexpected("missing label"))?;
                Ok(Tag {
                    id: id as u32,
                    label: label.to_string(),
                })
            },
        );
        let tag = Tag {
            id: 9,
            label: "home".into(),
        };
        let wire = codec.encode(&tag).unwrap();
        assert_eq!(wire, json!([9, "home"]));
        assert_eq!(codec.decode(wire).unwrap(), tag);
    }
}
