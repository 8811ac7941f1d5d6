//! Project-id derivation under the provider's naming constraints.

use uuid::Uuid;

/// Provider ceiling on project-id length.
const MAX_ID_LEN: usize = 30;

/// Derive a fresh project id from `prefix`.
///
/// A short random suffix keeps ids unique across iterations; the result is
/// lower-cased, every character outside `[a-z0-9-]` becomes `-`, and the
/// whole id is capped at 30 characters. Sanitizes rather than fails: the
/// caller is responsible for validating the prefix itself.
pub fn new_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let candidate = format!("{}-{}", prefix, &suffix[..8]).to_lowercase();

    let mut id: String = candidate
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => c,
            _ => '-',
        })
        .collect();

    id.truncate(MAX_ID_LEN);
    // The provider rejects ids ending in a dash.
    while id.ends_with('-') {
        id.pop();
    }
    id
}
