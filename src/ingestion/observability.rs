use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::LoadError;
use crate::types::LoadReport;

use super::pipeline::LoadStage;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (e.g. the caller cancelled).
    Warning,
    /// Error-level event (the load failed, the target was left as it was or only appended to).
    Error,
    /// Critical error (the database was unreachable, or a dropped collection could not be refilled).
    Critical,
}

/// Context about a load attempt.
#[derive(Debug, Clone)]
pub struct LoadContext {
    /// Source name of the input.
    pub input: String,
    /// Target collection.
    pub collection: String,
}

/// Observer interface for load outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait LoadObserver: Send + Sync {
    /// Called on every pipeline stage change.
    fn on_transition(&self, _ctx: &LoadContext, _from: LoadStage, _to: LoadStage) {}

    /// Called when a load succeeds.
    fn on_success(&self, _ctx: &LoadContext, _report: &LoadReport) {}

    /// Called when a load fails.
    fn on_failure(&self, _ctx: &LoadContext, _severity: LoadSeverity, _error: &LoadError) {}

    /// Called when a load failure meets an alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        self.on_failure(ctx, severity, error)
    }
}

/// Severity of a failed load. `dropped` tells whether the target collection had already been
/// dropped when the error happened.
pub fn severity_for_error(e: &LoadError, dropped: bool) -> LoadSeverity {
    match e {
        LoadError::Io { .. } | LoadError::Connection { .. } => LoadSeverity::Critical,
        LoadError::Insert { .. } if dropped => LoadSeverity::Critical,
        LoadError::Insert { .. } | LoadError::Drop { .. } => LoadSeverity::Error,
        LoadError::Cancelled { .. } => LoadSeverity::Warning,
        LoadError::EmptyInput { .. }
        | LoadError::MalformedInput { .. }
        | LoadError::UnrecognizedFormat { .. }
        | LoadError::InvalidIdentifierFormat { .. }
        | LoadError::InvalidConfiguration { .. } => LoadSeverity::Error,
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn LoadObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn LoadObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl LoadObserver for CompositeObserver {
    fn on_transition(&self, ctx: &LoadContext, from: LoadStage, to: LoadStage) {
        for o in &self.observers {
            o.on_transition(ctx, from, to);
        }
    }

    fn on_success(&self, ctx: &LoadContext, report: &LoadReport) {
        for o in &self.observers {
            o.on_success(ctx, report);
        }
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Prints one line per event to stderr.
///
/// Stage changes are printed too unless the observer was built with [`StdErrObserver::quiet`].
#[derive(Debug, Default)]
pub struct StdErrObserver {
    quiet: bool,
}

impl StdErrObserver {
    /// Only print outcomes, not stage changes.
    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

fn failure_line(tag: &str, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) -> String {
    format!(
        "{tag}[{severity:?}] {} -> {}: {error}",
        ctx.input, ctx.collection
    )
}

impl LoadObserver for StdErrObserver {
    fn on_transition(&self, ctx: &LoadContext, from: LoadStage, to: LoadStage) {
        if !self.quiet {
            eprintln!("[load] {} -> {}: {from} => {to}", ctx.input, ctx.collection);
        }
    }

    fn on_success(&self, ctx: &LoadContext, report: &LoadReport) {
        let verb = if report.dropped { "replaced" } else { "appended" };
        eprintln!(
            "[load][ok] {} -> {}: {verb}, {} inserted",
            ctx.input, report.collection, report.inserted
        );
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        eprintln!("{}", failure_line("[load]", ctx, severity, error));
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        eprintln!("{}", failure_line("[ALERT][load]", ctx, severity, error));
    }
}

/// Appends one JSON object per event to a local file (JSON lines).
///
/// Every line carries `ts` (unix seconds), `event`, `input` and `collection`; transitions add
/// `from`/`to`, successes the [`LoadReport`], failures `severity` and `error`. Writes are
/// best-effort: a log file that cannot be opened or written is skipped.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn record(&self, event: &str, ctx: &LoadContext, fields: serde_json::Value) {
        let mut line = serde_json::json!({
            "ts": unix_ts(),
            "event": event,
            "input": ctx.input,
            "collection": ctx.collection,
        });
        if let (Some(line), serde_json::Value::Object(extra)) = (line.as_object_mut(), fields) {
            line.extend(extra);
        }

        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl LoadObserver for FileObserver {
    fn on_transition(&self, ctx: &LoadContext, from: LoadStage, to: LoadStage) {
        self.record(
            "transition",
            ctx,
            serde_json::json!({ "from": from.to_string(), "to": to.to_string() }),
        );
    }

    fn on_success(&self, ctx: &LoadContext, report: &LoadReport) {
        let report = serde_json::to_value(report).unwrap_or_default();
        self.record("success", ctx, serde_json::json!({ "report": report }));
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        self.record("failure", ctx, failure_fields(severity, error));
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        self.record("alert", ctx, failure_fields(severity, error));
    }
}

fn failure_fields(severity: LoadSeverity, error: &LoadError) -> serde_json::Value {
    serde_json::json!({
        "severity": format!("{severity:?}"),
        "kind": format!("{:?}", error.kind()),
        "error": error.to_string(),
    })
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
