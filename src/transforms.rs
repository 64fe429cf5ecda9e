use anyhow::Result;
use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::xxh3_64;

use functor_pool::Functor;

use crate::cli::TransformKind;

/// Line transform run by each fpmap worker
#[derive(Debug, Clone)]
pub struct LineTransform {
    kind: TransformKind,
    lines_processed: usize,
}

impl LineTransform {
    pub fn new(kind: TransformKind) -> Self {
        Self {
            kind,
            lines_processed: 0,
        }
    }

    pub fn apply(&self, line: &str) -> String {
        match self.kind {
            TransformKind::Upper => line.to_uppercase(),
            TransformKind::Lower => line.to_lowercase(),
            TransformKind::Reverse => line.chars().rev().collect(),
            TransformKind::Len => line.chars().count().to_string(),
            TransformKind::Sha256 => hex::encode(Sha256::digest(line.as_bytes())),
            TransformKind::Xxh3 => format!("{:016x}", xxh3_64(line.as_bytes())),
        }
    }
}

impl Functor for LineTransform {
    type Input = String;
    type Output = String;

    fn setup(&mut self) -> Result<()> {
        tracing::debug!(transform = ?self.kind, "worker transform ready");
        Ok(())
    }

    fn process(&mut self, line: String) -> Result<String> {
        self.lines_processed += 1;
        Ok(self.apply(&line))
    }

    fn teardown(&mut self) {
        tracing::debug!(lines = self.lines_processed, "worker transform finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_transforms() {
        assert_eq!(LineTransform::new(TransformKind::Upper).apply("Straße"), "STRASSE");
        assert_eq!(LineTransform::new(TransformKind::Lower).apply("ÄBC"), "äbc");
    }

    #[test]
    fn test_reverse_and_len_count_chars() {
        assert_eq!(LineTransform::new(TransformKind::Reverse).apply("café"), "éfac");
        assert_eq!(LineTransform::new(TransformKind::Len).apply("café"), "4");
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            LineTransform::new(TransformKind::Sha256).apply("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_xxh3_is_fixed_width_hex() {
        let out = LineTransform::new(TransformKind::Xxh3).apply("hello");
        assert_eq!(out.len(), 16);
        assert!(out.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_process_counts_lines() {
        let mut transform = LineTransform::new(TransformKind::Len);
        transform.process("ab".to_string()).unwrap();
        transform.process("cd".to_string()).unwrap();
        assert_eq!(transform.lines_processed, 2);
    }
}
