//! Resource name generation

use rand::Rng;
use sha2::{Digest, Sha256};

const MAX_BASE_LEN: usize = 40;
const SUFFIX_LEN: usize = 5;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Lowercase DNS-label form: `[a-z0-9-]`, no leading/trailing/double dashes
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.truncate(MAX_BASE_LEN);
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "node".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Stable name prefix for nodes of a component in a graph
#[must_use]
pub fn node_generate_name(project: &str, graph: &str, module: &str, component: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [project, graph, module] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hex::encode(hasher.finalize());
    format!("{}-{}", sanitize(component), &digest[..8])
}

/// Random lowercase base36 suffix
#[must_use]
pub fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect()
}

/// Fresh name for a node created in the editor
#[must_use]
pub fn new_node_name(project: &str, graph: &str, module: &str, component: &str) -> String {
    format!(
        "{}-{}",
        node_generate_name(project, graph, module, component),
        random_suffix()
    )
}

/// Fresh name for a node copied into another graph
#[must_use]
pub fn transfer_name(component: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", sanitize(component), &id[..8])
}

/// Uniqueness suffix carried over from an imported id: the part after the
/// last dash, or a random one when there is none.
#[must_use]
pub fn import_suffix(old_id: &str) -> String {
    match old_id.rsplit_once('-') {
        Some((_, suffix)) if !suffix.is_empty() => sanitize(suffix),
        _ => random_suffix(),
    }
}
