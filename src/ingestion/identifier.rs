//! `_id` coercion.
//!
//! When enabled, a bare string `_id` is turned into an ObjectId. Every other `_id` type (numbers,
//! booleans, documents, ObjectIds already produced by `{"$oid": ...}`) is left exactly as supplied.

use mongodb::bson::oid::ObjectId;
use mongodb::bson::Bson;

use crate::types::NativeDocument;

/// Name of the primary-key field.
pub const ID_FIELD: &str = "_id";

/// A string `_id` that is not a valid ObjectId representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIdentifier {
    /// The offending `_id` string.
    pub value: String,
}

/// Apply the coercion policy to one document.
pub fn coerce_identifier(
    mut doc: NativeDocument,
    enabled: bool,
) -> Result<NativeDocument, InvalidIdentifier> {
    if !enabled {
        return Ok(doc);
    }
    let coerced = match doc.get(ID_FIELD) {
        Some(Bson::String(raw)) => {
            Some(ObjectId::parse_str(raw).map_err(|_| InvalidIdentifier { value: raw.clone() })?)
        }
        _ => None,
    };
    if let Some(oid) = coerced {
        doc.insert(ID_FIELD, Bson::ObjectId(oid));
    }
    Ok(doc)
}
