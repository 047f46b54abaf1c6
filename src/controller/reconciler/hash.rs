//! # Configuration Hash
//!
//! Fingerprint over the content of every ConfigMap and Secret a workload consumes.
//!
//! The hashed document is JSON with sorted keys:
//!
//! ```json
//! {"configMaps":{"<name>":{"<key>":"<value>"}},"secrets":{"<name>":{"<key>":"<base64>"}}}
//! ```
//!
//! Strings are escaped the way Go's `encoding/json` escapes them so digests stay
//! stable for workloads that were fingerprinted before this controller took over.
//! Children that do not exist are left out of the document entirely.

use crate::controller::reconciler::children::{ConfigObject, ResolvedChild};
use crate::controller::reconciler::types::ReconcilerError;
use k8s_openapi::ByteString;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Default, Serialize)]
struct HashSource<'a> {
    #[serde(rename = "configMaps")]
    config_maps: BTreeMap<&'a str, Option<&'a BTreeMap<String, String>>>,
    secrets: BTreeMap<&'a str, Option<&'a BTreeMap<String, ByteString>>>,
    #[serde(rename = "configMapsBinary", skip_serializing_if = "BTreeMap::is_empty")]
    config_maps_binary: BTreeMap<&'a str, &'a BTreeMap<String, ByteString>>,
}

/// Build the canonical JSON document the fingerprint is computed over
pub fn hash_source_document(children: &[ResolvedChild]) -> Result<String, ReconcilerError> {
    let mut source = HashSource::default();

    for object in children.iter().filter_map(|c| c.object.as_ref()) {
        match object {
            ConfigObject::ConfigMap(cm) => {
                source.config_maps.insert(object.name(), cm.data.as_ref());
                if let Some(binary) = cm.binary_data.as_ref().filter(|b| !b.is_empty()) {
                    source.config_maps_binary.insert(object.name(), binary);
                }
            }
            ConfigObject::Secret(secret) => {
                source.secrets.insert(object.name(), secret.data.as_ref());
            }
        }
    }

    let json = serde_json::to_string(&source)?;
    Ok(escape_go_json(&json))
}

/// Hex-encoded SHA-256 over the children's content
pub fn calculate_config_hash(children: &[ResolvedChild]) -> Result<String, ReconcilerError> {
    let document = hash_source_document(children)?;
    let digest = Sha256::digest(document.as_bytes());
    Ok(format!("{digest:x}"))
}

// Rewrites serde_json output into what Go's encoder emits for the same document.
// HTML-significant characters only occur inside strings, and a backslash in the
// output always starts an escape sequence, so a single pass is enough.
fn escape_go_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut chars = json.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                // Go spells these two as \u escapes
                Some('b') => out.push_str("\\u0008"),
                Some('f') => out.push_str("\\u000c"),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out
}
