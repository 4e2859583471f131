//! `mongo-json-load` loads JSON documents into MongoDB collections.
//!
//! The primary entrypoint is [`ingestion::load`] (or [`ingestion::load_from_path`]), which takes
//! the raw bytes of one input, turns them into BSON documents and writes them to a collection
//! named after the input (or the one given in [`LoadOptions`]).
//!
//! ## What you can load
//!
//! **Layouts (detected from the first non-whitespace character):**
//!
//! - `[` - a JSON array of objects: `[{"a":1}, {"a":2}]`
//! - `{` - a `mongoexport` dump, one object per line; blank lines are skipped
//!
//! Anything else is rejected with [`LoadError::UnrecognizedFormat`]. A batch is all-or-nothing:
//! one bad line rejects the whole input before the database is touched.
//!
//! **Extended JSON:**
//!
//! Single-key wrapper objects become native BSON values, e.g. `{"$date": "1963-10-06T00:00:00Z"}`
//! becomes a BSON datetime and `{"$oid": "578611d17c8a27dd5b329fd5"}` an ObjectId. See
//! [`ingestion::extjson`] for the full list. Objects with a marker key *and* other keys are left
//! alone.
//!
//! **`_id` coercion:**
//!
//! By default a string `_id` is converted to an ObjectId (and must be a valid one). Numbers,
//! booleans and other types are never touched. Disable with
//! [`LoadOptions::coerce_identifier_strings`].
//!
//! ## Quick example
//!
//! ```no_run
//! use mongo_json_load::execution::Cancellation;
//! use mongo_json_load::ingestion::load;
//! use mongo_json_load::store::MongoStore;
//! use mongo_json_load::{LoadOptions, RawInput};
//!
//! # async fn run() -> Result<(), mongo_json_load::LoadError> {
//! let input = RawInput::new(
//!     "characters.json",
//!     "{\"name\":\"Han\"}\n{\"name\":\"Leia\"}\n",
//! );
//! let opts = LoadOptions {
//!     drop_existing: true,
//!     ..Default::default()
//! };
//! let report = load(input, &opts, &MongoStore::new(), &Cancellation::none()).await?;
//! assert_eq!(report.inserted, 2);
//! # Ok(())
//! # }
//! ```
//!
//! Tests and dry runs can use [`store::MemoryStore`] instead of a live server:
//!
//! ```rust
//! use mongo_json_load::execution::Cancellation;
//! use mongo_json_load::ingestion::load_with_config;
//! use mongo_json_load::store::MemoryStore;
//! use mongo_json_load::{LoadOptions, ProcessEnv, RawInput};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = MemoryStore::new();
//! let input = RawInput::new("users.json", r#"[{"a":1},{"a":2}]"#);
//! let config = LoadOptions::default().resolve(&input, &ProcessEnv).unwrap();
//! let report = load_with_config(input, &config, &store, &Cancellation::none())
//!     .await
//!     .unwrap();
//! assert_eq!(report.inserted, 2);
//! assert_eq!(store.count("users"), 2);
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: parsing, Extended JSON decoding, `_id` policy, the load pipeline, observers
//! - [`store`]: the document store traits plus MongoDB and in-memory implementations
//! - [`execution`]: parallel batch preparation and cancellation
//! - [`config`]: options and their resolution
//! - [`types`]: raw input, document aliases and the load report
//! - [`error`]: error types

pub mod config;
pub mod error;
pub mod execution;
pub mod ingestion;
pub mod store;
pub mod types;

pub use config::{Environment, LoadConfiguration, LoadOptions, ProcessEnv};
pub use error::{LoadError, LoadErrorKind, LoadResult};
pub use types::{GenericDocument, LoadReport, NativeDocument, RawInput};
