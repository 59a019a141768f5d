// ── Content rewriting ────────────────────────────────────────────────────────

use indexmap::IndexMap;
use memchr::memmem::Finder;

/// Apply each literal `search → replace` rule in declaration order. Later
/// rules operate on the output of earlier ones. Empty search keys are skipped.
pub fn transform(input: &[u8], rules: &IndexMap<String, String>) -> Vec<u8> {
    let mut current = input.to_vec();
    for (search, replace) in rules {
        if search.is_empty() {
            continue;
        }
        current = replace_all(&current, search.as_bytes(), replace.as_bytes());
    }
    current
}

fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut last = 0;
    for start in Finder::new(needle).find_iter(haystack) {
        out.extend_from_slice(&haystack[last..start]);
        out.extend_from_slice(replacement);
        last = start + needle.len();
    }
    out.extend_from_slice(&haystack[last..]);
    out
}
