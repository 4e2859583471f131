//! Ingestion stages and the load pipeline.
//!
//! Most callers should use [`load`] or [`load_from_path`] (from [`pipeline`]) which:
//!
//! - sniff the input layout and parse it into documents ([`json`])
//! - decode Extended JSON wrappers into BSON values ([`extjson`])
//! - apply the `_id` coercion policy ([`identifier`])
//! - connect, optionally drop, and bulk-insert into the target collection
//! - optionally report outcomes to a [`LoadObserver`]

pub mod extjson;
pub mod identifier;
pub mod json;
pub mod observability;
pub mod pipeline;

pub use extjson::{decode_document, decode_value};
pub use identifier::{coerce_identifier, InvalidIdentifier, ID_FIELD};
pub use json::{parse_documents, sniff_format, ContentFormat};
pub use observability::{
    severity_for_error, CompositeObserver, FileObserver, LoadContext, LoadObserver, LoadSeverity,
    StdErrObserver,
};
pub use pipeline::{load, load_from_path, load_with_config, LoadRequest, LoadStage};
