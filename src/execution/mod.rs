//! Execution support for a load.
//!
//! - [`prepare_documents`]: decodes and coerces a parsed batch on the rayon pool
//! - [`Cancellation`]: caller-supplied signal/deadline raced against every store step

mod cancel;

use rayon::prelude::*;

use crate::error::{LoadError, LoadResult};
use crate::ingestion::{coerce_identifier, decode_document};
use crate::types::{GenericDocument, NativeDocument};

pub use cancel::{CancelHandle, Cancellation};

/// Decode every document and apply the `_id` policy, preserving order.
///
/// Documents are independent, so the batch is processed in parallel. If several documents carry
/// an invalid `_id`, which one is reported is unspecified; the batch fails either way.
pub fn prepare_documents(
    input: &str,
    docs: Vec<GenericDocument>,
    coerce_identifier_strings: bool,
) -> LoadResult<Vec<NativeDocument>> {
    docs.into_par_iter()
        .enumerate()
        .map(|(index, doc)| {
            coerce_identifier(decode_document(doc), coerce_identifier_strings).map_err(|invalid| {
                LoadError::InvalidIdentifierFormat {
                    input: input.to_string(),
                    index,
                    value: invalid.value,
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::prepare_documents;
    use crate::error::LoadError;
    use mongodb::bson::Bson;
    use serde_json::{json, Value};

    fn objects(values: Vec<Value>) -> Vec<serde_json::Map<String, Value>> {
        values
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => map,
                other => panic!("not an object: {other}"),
            })
            .collect()
    }

    #[test]
    fn order_is_preserved_across_threads() {
        let docs = objects((0..2_000).map(|i| json!({ "n": i })).collect());
        let out = prepare_documents("n.json", docs, true).unwrap();
        assert_eq!(out.len(), 2_000);
        for (i, doc) in out.iter().enumerate() {
            assert_eq!(doc.get("n"), Some(&Bson::Int32(i as i32)));
        }
    }

    #[test]
    fn invalid_identifier_reports_its_index() {
        let docs = objects(vec![
            json!({ "_id": "578611d17c8a27dd5b329fd5" }),
            json!({ "_id": "nope" }),
        ]);
        let err = prepare_documents("ids.json", docs, true).unwrap_err();
        match err {
            LoadError::InvalidIdentifierFormat { input, index, value } => {
                assert_eq!(input, "ids.json");
                assert_eq!(index, 1);
                assert_eq!(value, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
