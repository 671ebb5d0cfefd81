pub mod health;

use std::fmt::Write;

/// Renders (signature, count) pairs as folded-stack text: one
/// `"<signature> <count>\n"` line per entry, no header or footer.
///
/// Signatures are emitted verbatim; the format is the standard input for
/// flame-graph rendering tools, which tolerate literal symbol names.
pub fn render_folded(entries: &[(String, u64)]) -> String {
    let mut out = String::with_capacity(entries.len() * 64);
    for (signature, count) in entries {
        // Writes to a String cannot fail.
        let _ = writeln!(out, "{signature} {count}");
    }
    out
}
