//! MOOSE-Z Library
//!
//! Orchestration core for MOOSE segmentations: compute device selection, the managed
//! console/log output session, the pretrained model registry, run settings, and the
//! launcher for the external nnU-Net runtime.

pub mod error;
pub mod inference;
pub mod models;
pub mod output;
pub mod storage;
pub mod system;

pub use error::{MooseError, Result};

/// Keep at most `max_chars` characters of `s`, never splitting a char.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("segment", 3), "seg");
        assert_eq!(truncate_chars("✔ done", 2), "✔ ");
        assert_eq!(truncate_chars("Lösung läuft", 6), "Lösung");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("short", 5), "short");
    }
}
