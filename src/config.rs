//! Load options and their resolution into a [`LoadConfiguration`].
//!
//! [`LoadOptions`] is what callers fill in (everything optional, see [`Default`]).
//! [`LoadOptions::resolve`] turns it into an immutable [`LoadConfiguration`] once per input, reading
//! the environment through the [`Environment`] trait so resolution can be tested without touching
//! the process environment.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{LoadError, LoadResult};
use crate::ingestion::{LoadObserver, LoadSeverity};
use crate::types::RawInput;

/// Environment variable holding the base connection string (scheme and host, no database).
pub const CONNECTION_STRING_ENV: &str = "MONGO_JSON_LOAD_CONNECTION_STRING";

/// Database used when the connection string names none.
pub const DEFAULT_DATABASE: &str = "nope";

/// Connection string used when neither the options nor the environment provide one.
pub const DEFAULT_ADDRESS: &str = "mongodb://localhost/nope";

/// Source of environment variables.
pub trait Environment {
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Options controlling a load.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct LoadOptions {
    /// Connection string. If `None`, taken from [`CONNECTION_STRING_ENV`] (with
    /// [`DEFAULT_DATABASE`] appended), else [`DEFAULT_ADDRESS`].
    pub target_address: Option<String>,
    /// Collection name. If `None`, the input's source name with directory and extension stripped.
    pub target_collection: Option<String>,
    /// Drop the collection (if it exists) before inserting.
    pub drop_existing: bool,
    /// Turn string `_id` values into ObjectIds.
    pub coerce_identifier_strings: bool,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn LoadObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: LoadSeverity,
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("target_address_set", &self.target_address.is_some())
            .field("target_collection", &self.target_collection)
            .field("drop_existing", &self.drop_existing)
            .field("coerce_identifier_strings", &self.coerce_identifier_strings)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            target_address: None,
            target_collection: None,
            drop_existing: false,
            coerce_identifier_strings: true,
            observer: None,
            alert_at_or_above: LoadSeverity::Critical,
        }
    }
}

impl LoadOptions {
    /// Resolve defaults for `input` against `env`.
    pub fn resolve(&self, input: &RawInput, env: &dyn Environment) -> LoadResult<LoadConfiguration> {
        let target_address = resolve_address(self.target_address.as_deref(), env);
        let target_collection = self
            .target_collection
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| input.stem())
            .ok_or_else(|| LoadError::InvalidConfiguration {
                input: input.source_name().to_string(),
                message: "no collection name given and none derivable from the source name"
                    .to_string(),
            })?;
        validate_collection_name(input.source_name(), target_collection)?;

        Ok(LoadConfiguration {
            target_address,
            target_collection: target_collection.to_string(),
            drop_existing: self.drop_existing,
            coerce_identifier_strings: self.coerce_identifier_strings,
            observer: self.observer.clone(),
            alert_at_or_above: self.alert_at_or_above,
        })
    }
}

fn resolve_address(explicit: Option<&str>, env: &dyn Environment) -> String {
    if let Some(address) = explicit.filter(|a| !a.trim().is_empty()) {
        return address.to_string();
    }
    match env.var(CONNECTION_STRING_ENV) {
        Some(base) if !base.trim().is_empty() => {
            format!("{}/{}", base.trim().trim_end_matches('/'), DEFAULT_DATABASE)
        }
        _ => DEFAULT_ADDRESS.to_string(),
    }
}

fn validate_collection_name(input: &str, name: &str) -> LoadResult<()> {
    if name.contains('$') || name.contains('\0') {
        return Err(LoadError::InvalidConfiguration {
            input: input.to_string(),
            message: format!("collection name '{name}' must not contain '$' or NUL"),
        });
    }
    Ok(())
}

/// Fully resolved, immutable settings for one load.
#[derive(Clone)]
pub struct LoadConfiguration {
    pub target_address: String,
    pub target_collection: String,
    pub drop_existing: bool,
    pub coerce_identifier_strings: bool,
    pub observer: Option<Arc<dyn LoadObserver>>,
    pub alert_at_or_above: LoadSeverity,
}

impl fmt::Debug for LoadConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The address may carry credentials.
        f.debug_struct("LoadConfiguration")
            .field("target_collection", &self.target_collection)
            .field("drop_existing", &self.drop_existing)
            .field("coerce_identifier_strings", &self.coerce_identifier_strings)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}
