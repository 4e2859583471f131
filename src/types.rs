//! Core data model types for loading.
//!
//! A [`RawInput`] is parsed into [`GenericDocument`]s, which are decoded into
//! [`NativeDocument`]s before being handed to a [`crate::store::DocumentStore`].

use std::path::Path;

use serde::Serialize;

/// A parsed JSON object, key order preserved.
pub type GenericDocument = serde_json::Map<String, serde_json::Value>;

/// A decoded document with every Extended JSON wrapper replaced by its BSON value.
pub type NativeDocument = mongodb::bson::Document;

/// Raw bytes of one logical input unit (usually a file) plus the name it came from.
///
/// The source name is only used to label errors and to derive a default collection name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInput {
    source_name: String,
    content: Vec<u8>,
}

impl RawInput {
    /// Create an input from a source name and its content.
    pub fn new(source_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            source_name: source_name.into(),
            content: content.into(),
        }
    }

    /// Read an input from disk, using the path as its source name.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        Ok(Self::new(path.display().to_string(), content))
    }

    /// Name of the source this input came from.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Raw content bytes.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Source name with any directory and extension stripped (`data/users-test.json` ->
    /// `users-test`).
    pub fn stem(&self) -> Option<&str> {
        Path::new(&self.source_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
    }
}

/// Summary of a successful load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Collection the documents were written to.
    pub collection: String,
    /// Number of documents inserted.
    pub inserted: usize,
    /// Whether an existing collection was dropped first.
    pub dropped: bool,
}

#[cfg(test)]
mod tests {
    use super::RawInput;

    #[test]
    fn stem_strips_directory_and_extension() {
        let input = RawInput::new("test/fixtures/users-test.json", "[]");
        assert_eq!(input.stem(), Some("users-test"));
    }

    #[test]
    fn stem_keeps_inner_dots() {
        let input = RawInput::new("export.2024.ndjson", "{}");
        assert_eq!(input.stem(), Some("export.2024"));
    }

    #[test]
    fn stem_of_empty_name_is_none() {
        assert_eq!(RawInput::new("", "[]").stem(), None);
    }
}
