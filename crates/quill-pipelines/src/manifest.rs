//! Import manifest format and two-phase link rewriting.
//!
//! Imported archives are JSON manifests of collections and documents keyed
//! by external ids. Cross-document links inside imported content use
//! `quill://<externalId>` source references. Link resolution is two-phase:
//! during parsing every source reference becomes an opaque
//! `<<externalId>>` placeholder, and only the finalize step, once every
//! target document exists, substitutes placeholders with real internal
//! URLs. Deferring resolution this way sidesteps forward references
//! entirely: a document may link to one persisted three batches later.

use std::collections::HashMap;

use quill_queue::TaskError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Root of an imported archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportManifest {
    /// Collections to create, in order. Each is one unit of pipeline work.
    pub collections: Vec<CollectionInput>,
}

/// One collection and its documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInput {
    /// Identifier from the source system; the idempotence key.
    pub external_id: String,

    /// Collection name.
    pub name: String,

    /// Documents belonging to the collection.
    pub documents: Vec<DocumentInput>,
}

/// One document inside an imported collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInput {
    /// Identifier from the source system; the idempotence key.
    pub external_id: String,

    /// Document title.
    pub title: String,

    /// Markdown body, possibly containing `quill://` source references.
    pub text: String,
}

/// Parses a staged upload into a manifest.
///
/// # Errors
///
/// Malformed input is a terminal failure: retrying cannot fix the file.
pub fn parse_manifest(bytes: &[u8]) -> Result<ImportManifest, TaskError> {
    serde_json::from_slice(bytes)
        .map_err(|e| TaskError::terminal(format!("unreadable import file: {e}")))
}

/// Parse-phase rewrite: `quill://<externalId>` becomes `<<externalId>>`.
pub fn rewrite_source_links(text: &str) -> String {
    source_link_pattern().replace_all(text, "<<$1>>").into_owned()
}

/// Finalize-phase rewrite: substitutes placeholders with resolved internal
/// references. Placeholders with no resolution are left in place; the
/// target was absent from the archive, and mangling the text would lose
/// that information.
pub fn substitute_placeholders(text: &str, resolved: &HashMap<String, String>) -> String {
    placeholder_pattern()
        .replace_all(text, |captures: &regex::Captures<'_>| {
            let external_id = &captures[1];
            match resolved.get(external_id) {
                Some(url) => url.clone(),
                None => captures[0].to_string(),
            }
        })
        .into_owned()
}

/// Whether any unresolved placeholders remain in the text.
pub fn has_placeholders(text: &str) -> bool {
    placeholder_pattern().is_match(text)
}

fn source_link_pattern() -> Regex {
    Regex::new(r"quill://([A-Za-z0-9._\-]+)").expect("static pattern compiles")
}

fn placeholder_pattern() -> Regex {
    Regex::new(r"<<([A-Za-z0-9._\-]+)>>").expect("static pattern compiles")
}
