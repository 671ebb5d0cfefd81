//! Collapses a raw leaf-first frame sequence into the canonical signature
//! used as the aggregation key.

use std::fmt::Write;

use crate::snapshot::Frame;

/// Separates frames inside a collapsed signature.
pub const FRAME_DELIMITER: char = ';';

/// Builds the canonical signature for a leaf-first stack, bounded to
/// `max_depth` frames.
///
/// Only the innermost `min(n, max_depth)` frames are considered; when the
/// stack is deeper than `max_depth`, ancestry toward the program root is
/// discarded, never detail near the sampled instruction. The kept frames are
/// emitted in root-to-leaf order, joined by [`FRAME_DELIMITER`].
pub fn collapse(frames: &[Frame], max_depth: usize) -> String {
    let depth = frames.len().min(max_depth);
    let mut signature = String::new();

    for (i, frame) in frames[..depth].iter().enumerate().rev() {
        // The write! cannot fail on a String.
        let _ = write!(signature, "{frame}");
        if i > 0 {
            signature.push(FRAME_DELIMITER);
        }
    }

    signature
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(names: &[&str]) -> Vec<Frame> {
        names.iter().map(|n| Frame::new("", *n)).collect()
    }

    #[test]
    fn test_collapse_reverses_to_root_first() {
        // Leaf-first input comes out root-to-leaf.
        let stack = frames(&["leaf", "mid", "root"]);
        assert_eq!(collapse(&stack, 10), "root;mid;leaf");
    }

    #[test]
    fn test_collapse_truncation_keeps_leaf_side() {
        // Depth 3 over a 4-deep stack drops the root, not the leaf.
        let stack = frames(&["leaf", "mid", "outer", "root"]);
        assert_eq!(collapse(&stack, 3), "outer;mid;leaf");
    }

    #[test]
    fn test_collapse_depth_one() {
        let stack = frames(&["leaf", "mid", "root"]);
        assert_eq!(collapse(&stack, 1), "leaf");
    }

    #[test]
    fn test_collapse_empty_stack() {
        assert_eq!(collapse(&[], 10), "");
    }

    #[test]
    fn test_collapse_is_deterministic() {
        let stack = frames(&["a", "b", "c", "d", "e"]);
        let first = collapse(&stack, 4);
        for _ in 0..16 {
            assert_eq!(collapse(&stack, 4), first);
        }
    }

    #[test]
    fn test_collapse_includes_module_path() {
        let stack = vec![
            Frame::new("app::handler", "serve"),
            Frame::new("app", "main"),
        ];
        assert_eq!(collapse(&stack, 10), "app::main;app::handler::serve");
    }
}
