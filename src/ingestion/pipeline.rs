//! Load pipeline.
//!
//! Most callers should use [`load`] or [`load_from_path`], which take one input through
//!
//! `Idle → Connecting → (Dropping →) Inserting → Done`
//!
//! with `Failed` reachable from every non-terminal stage. Parsing, Extended JSON decoding and
//! `_id` coercion all happen while `Idle`, on tokio's blocking pool, so a bad input never reaches
//! the database and a large batch does not hold up other loads on the same runtime. The
//! connection is closed on every path out of the pipeline before the outcome is returned.
//!
//! Dropping and inserting are not atomic: if the insert fails after a drop, the collection stays
//! dropped (or partially filled).

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{LoadConfiguration, LoadOptions, ProcessEnv};
use crate::error::{LoadError, LoadResult};
use crate::execution::{prepare_documents, Cancellation};
use crate::store::{DocumentStore, StoreConnection, StoreError};
use crate::types::{LoadReport, NativeDocument, RawInput};

use super::json::parse_documents;
use super::observability::{severity_for_error, LoadContext, LoadObserver, LoadSeverity};

/// Stages of the load state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStage {
    Idle,
    Connecting,
    Dropping,
    Inserting,
    Done,
    Failed,
}

impl LoadStage {
    /// `Done` and `Failed` end a load.
    pub fn is_terminal(self) -> bool {
        matches!(self, LoadStage::Done | LoadStage::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: LoadStage) -> bool {
        use LoadStage::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Idle, Connecting)
            | (Connecting, Dropping)
            | (Connecting, Inserting)
            | (Dropping, Inserting)
            | (Inserting, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadStage::Idle => "idle",
            LoadStage::Connecting => "connecting",
            LoadStage::Dropping => "dropping",
            LoadStage::Inserting => "inserting",
            LoadStage::Done => "done",
            LoadStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Load one input, resolving `options` against the process environment.
///
/// When an observer is configured, this function reports:
///
/// - `on_transition` for every stage change
/// - `on_success` on success, with the [`LoadReport`]
/// - `on_failure` on failure, with a computed severity
/// - `on_alert` on failure when the computed severity is >= `options.alert_at_or_above`
///
/// # Examples
///
/// ## JSON array into a collection named after the file
///
/// ```no_run
/// use mongo_json_load::execution::Cancellation;
/// use mongo_json_load::ingestion::load;
/// use mongo_json_load::store::MongoStore;
/// use mongo_json_load::{LoadOptions, RawInput};
///
/// # async fn run() -> Result<(), mongo_json_load::LoadError> {
/// let input = RawInput::new("users.json", r#"[{"name":"Han"},{"name":"Leia"}]"#);
/// let report = load(input, &LoadOptions::default(), &MongoStore::new(), &Cancellation::none()).await?;
/// assert_eq!(report.collection, "users");
/// # Ok(())
/// # }
/// ```
///
/// ## Replace a collection, with a timeout
///
/// ```no_run
/// use std::time::Duration;
///
/// use mongo_json_load::execution::Cancellation;
/// use mongo_json_load::ingestion::load_from_path;
/// use mongo_json_load::store::MongoStore;
/// use mongo_json_load::LoadOptions;
///
/// # async fn run() -> Result<(), mongo_json_load::LoadError> {
/// let opts = LoadOptions {
///     target_address: Some("mongodb://localhost:27017/fixtures".to_string()),
///     drop_existing: true,
///     ..Default::default()
/// };
/// let cancel = Cancellation::none().with_timeout(Duration::from_secs(30));
/// let report = load_from_path("data/export-test.json", &opts, &MongoStore::new(), &cancel).await?;
/// println!("inserted={}", report.inserted);
/// # Ok(())
/// # }
/// ```
pub async fn load<S: DocumentStore>(
    input: RawInput,
    options: &LoadOptions,
    store: &S,
    cancel: &Cancellation,
) -> LoadResult<LoadReport> {
    let config = options.resolve(&input, &ProcessEnv)?;
    load_with_config(input, &config, store, cancel).await
}

/// Read a file and [`load`] it, using the path as the source name.
///
/// A file that cannot be read is reported to the observer as a [`LoadError::Io`] failure.
pub async fn load_from_path<S: DocumentStore>(
    path: impl AsRef<Path>,
    options: &LoadOptions,
    store: &S,
    cancel: &Cancellation,
) -> LoadResult<LoadReport> {
    let path = path.as_ref();
    let input = match RawInput::from_path(path).await {
        Ok(input) => input,
        Err(cause) => {
            let input = path.display().to_string();
            let collection = options
                .target_collection
                .clone()
                .filter(|name| !name.is_empty())
                .or_else(|| {
                    path.file_stem()
                        .and_then(|s| s.to_str())
                        .map(str::to_string)
                })
                .unwrap_or_default();
            let err = LoadError::Io {
                input: input.clone(),
                cause,
            };
            let ctx = LoadContext { input, collection };
            report_failure(
                options.observer.as_deref(),
                options.alert_at_or_above,
                &ctx,
                &err,
                false,
            );
            return Err(err);
        }
    };
    load(input, options, store, cancel).await
}

/// Load one input with an already resolved configuration.
pub async fn load_with_config<S: DocumentStore>(
    input: RawInput,
    config: &LoadConfiguration,
    store: &S,
    cancel: &Cancellation,
) -> LoadResult<LoadReport> {
    let mut run = Run::new(input.source_name(), config);
    let result = run.execute(input, store, cancel).await;

    match &result {
        Ok(report) => {
            tracing::info!(
                input = %run.ctx.input,
                collection = %report.collection,
                inserted = report.inserted,
                dropped = report.dropped,
                "load finished"
            );
            if let Some(obs) = config.observer.as_ref() {
                obs.on_success(&run.ctx, report);
            }
        }
        Err(e) => report_failure(
            config.observer.as_deref(),
            config.alert_at_or_above,
            &run.ctx,
            e,
            run.dropped,
        ),
    }

    result
}

fn report_failure(
    observer: Option<&dyn LoadObserver>,
    alert_at_or_above: LoadSeverity,
    ctx: &LoadContext,
    e: &LoadError,
    dropped: bool,
) {
    let sev = severity_for_error(e, dropped);
    tracing::warn!(input = %ctx.input, severity = ?sev, error = %e, "load failed");
    if let Some(obs) = observer {
        obs.on_failure(ctx, sev, e);
        if sev >= alert_at_or_above {
            obs.on_alert(ctx, sev, e);
        }
    }
}

struct Run<'a> {
    ctx: LoadContext,
    config: &'a LoadConfiguration,
    stage: LoadStage,
    dropped: bool,
}

impl<'a> Run<'a> {
    fn new(input: &str, config: &'a LoadConfiguration) -> Self {
        Self {
            ctx: LoadContext {
                input: input.to_string(),
                collection: config.target_collection.clone(),
            },
            config,
            stage: LoadStage::Idle,
            dropped: false,
        }
    }

    fn advance(&mut self, next: LoadStage) {
        debug_assert!(
            self.stage.can_transition_to(next),
            "illegal load transition {} -> {}",
            self.stage,
            next
        );
        tracing::debug!(input = %self.ctx.input, from = %self.stage, to = %next, "load stage");
        if let Some(obs) = self.config.observer.as_ref() {
            obs.on_transition(&self.ctx, self.stage, next);
        }
        self.stage = next;
    }

    fn fail<T>(&mut self, err: LoadError) -> LoadResult<T> {
        self.advance(LoadStage::Failed);
        Err(err)
    }

    fn cancelled(&self) -> LoadError {
        LoadError::Cancelled {
            input: self.ctx.input.clone(),
            stage: self.stage,
        }
    }

    async fn execute<S: DocumentStore>(
        &mut self,
        input: RawInput,
        store: &S,
        cancel: &Cancellation,
    ) -> LoadResult<LoadReport> {
        let coerce = self.config.coerce_identifier_strings;
        let preparing = tokio::task::spawn_blocking(move || {
            parse_documents(&input)
                .and_then(|docs| prepare_documents(input.source_name(), docs, coerce))
        });
        let docs = match cancel.run(preparing).await {
            Some(Ok(Ok(docs))) => docs,
            Some(Ok(Err(e))) => return self.fail(e),
            Some(Err(join)) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
            // Cancelled, or the runtime is shutting down.
            Some(Err(_)) | None => {
                let err = self.cancelled();
                return self.fail(err);
            }
        };

        let config = self.config;
        self.advance(LoadStage::Connecting);
        let conn = match cancel.run(store.connect(&config.target_address)).await {
            Some(Ok(conn)) => conn,
            Some(Err(cause)) => {
                return self.fail(LoadError::Connection {
                    input: self.ctx.input.clone(),
                    address: redact_address(&config.target_address),
                    cause,
                });
            }
            None => {
                let err = self.cancelled();
                return self.fail(err);
            }
        };

        let written = self.write(&conn, docs, cancel).await;
        conn.close().await;

        match written {
            Ok(inserted) => {
                self.advance(LoadStage::Done);
                Ok(LoadReport {
                    collection: config.target_collection.clone(),
                    inserted,
                    dropped: self.dropped,
                })
            }
            Err(e) => self.fail(e),
        }
    }

    async fn write<C: StoreConnection>(
        &mut self,
        conn: &C,
        docs: Vec<NativeDocument>,
        cancel: &Cancellation,
    ) -> LoadResult<usize> {
        let config = self.config;
        let collection = config.target_collection.as_str();

        if config.drop_existing {
            self.advance(LoadStage::Dropping);
            let step = async {
                let exists = conn.collection_exists(collection).await?;
                if exists {
                    conn.drop_collection(collection).await?;
                }
                Ok::<bool, StoreError>(exists)
            };
            match cancel.run(step).await {
                Some(Ok(dropped)) => self.dropped = dropped,
                Some(Err(cause)) => {
                    return Err(LoadError::Drop {
                        input: self.ctx.input.clone(),
                        collection: collection.to_string(),
                        cause,
                    });
                }
                None => return Err(self.cancelled()),
            }
        }

        self.advance(LoadStage::Inserting);
        if docs.is_empty() {
            return Ok(0);
        }
        match cancel.run(conn.insert_many(collection, docs)).await {
            Some(Ok(inserted)) => Ok(inserted),
            Some(Err(cause)) => Err(LoadError::Insert {
                input: self.ctx.input.clone(),
                collection: collection.to_string(),
                cause,
            }),
            None => Err(self.cancelled()),
        }
    }
}

/// Strip `user:password@` from a connection string before it ends up in an error message.
fn redact_address(address: &str) -> String {
    let Some((scheme, rest)) = address.split_once("://") else {
        return address.to_string();
    };
    let host_end = rest.find('/').unwrap_or(rest.len());
    match rest[..host_end].rfind('@') {
        Some(at) => format!("{scheme}://***@{}", &rest[at + 1..]),
        None => address.to_string(),
    }
}

/// Owned load request, for callers that queue work.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Path to the input file.
    pub path: PathBuf,
    /// Options controlling the load.
    pub options: LoadOptions,
}

impl LoadRequest {
    pub fn new(path: impl Into<PathBuf>, options: LoadOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    /// Execute the request by calling [`load_from_path`].
    pub async fn run<S: DocumentStore>(
        &self,
        store: &S,
        cancel: &Cancellation,
    ) -> LoadResult<LoadReport> {
        load_from_path(&self.path, &self.options, store, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::{redact_address, LoadStage};

    #[test]
    fn transitions_follow_the_state_machine() {
        use LoadStage::*;
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Inserting));
        assert!(Connecting.can_transition_to(Dropping));
        assert!(Dropping.can_transition_to(Inserting));
        assert!(Inserting.can_transition_to(Done));
        assert!(Idle.can_transition_to(Failed));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Idle.can_transition_to(Inserting));
        assert!(!Dropping.can_transition_to(Done));
    }

    #[test]
    fn credentials_are_redacted() {
        assert_eq!(
            redact_address("mongodb://user:secret@db:27017/nope"),
            "mongodb://***@db:27017/nope"
        );
        assert_eq!(redact_address("mongodb://db/nope"), "mongodb://db/nope");
        assert_eq!(redact_address("not a url"), "not a url");
    }
}
