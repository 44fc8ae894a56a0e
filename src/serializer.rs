//! The serializer contract between a node's value type and the bytes a
//! remote storage tier actually stores.
//!
//! Grounded on `original_source/v2/serializer.py`'s `Pickle`/`Json`/
//! `MsgPack`/`Compressed` serializer classes: one shared `dumps`/`loads`
//! contract, several interchangeable implementations. Concrete
//! serializers other than JSON are explicitly out of scope (spec §1); the
//! trait exists so a node can plug one in.
//!
//! This trait is deliberately **not** object-safe — `dumps`/`loads` are
//! generic over the value type, which a `dyn Serializer` cannot express.
//! A node selects its serializer through an associated type
//! (`Node::Serializer`) resolved at compile time, rather than a runtime
//! `Arc<dyn Serializer>`; see DESIGN.md's Open Questions section for why.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

/// Converts typed values to and from bytes for storage in a remote tier.
pub trait Serializer: Send + Sync + 'static {
    fn dumps<T: Serialize>(value: &T) -> Result<Vec<u8>, CacheError>;
    fn loads<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError>;
}

/// The reference serializer: `serde_json`, human-readable and universally
/// supported by the in-process test double and any future remote adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn dumps<T: Serialize>(value: &T) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(value).map_err(CacheError::from)
    }

    fn loads<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError> {
        serde_json::from_slice(bytes).map_err(CacheError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn json_serializer_round_trips() {
        let p = Point { x: 1, y: 2 };
        let bytes = JsonSerializer::dumps(&p).unwrap();
        let back: Point = JsonSerializer::loads(&bytes).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn json_serializer_reports_decode_errors() {
        let result: Result<Point, _> = JsonSerializer::loads(b"not json");
        assert!(result.is_err());
    }
}
