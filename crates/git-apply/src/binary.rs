//! Binary hunk application: literal replacement or packfile-style delta,
//! followed by a postimage hash check against the patch's `index` line.

use git_hash::hasher::Hasher;
use git_hash::{HashAlgorithm, ObjectId};
use git_pack::delta::apply::apply_delta;
use git_pack::PackError;

use crate::base85::inflate;
use crate::error::{ApplyError, Result};
use crate::patch::{BinaryHunk, BinaryMethod};

/// Apply a binary hunk against `preimage`, returning the postimage bytes.
pub fn apply_binary_hunk(preimage: &[u8], hunk: &BinaryHunk) -> Result<Vec<u8>> {
    let payload = inflate(&hunk.deflated_payload, hunk.original_length)?;
    match hunk.method {
        BinaryMethod::LiteralDeflated => Ok(payload),
        BinaryMethod::DeltaDeflated => {
            apply_delta(preimage, &payload).map_err(|e: PackError| ApplyError::Semantic(e.to_string()))
        }
    }
}

/// Verify the postimage's blob hash matches the `index` line's new-side hash.
pub fn verify_postimage_hash(path: &str, postimage: &[u8], expected_hex: &str) -> Result<()> {
    let expected = ObjectId::from_hex(expected_hex)
        .map_err(|e| ApplyError::Semantic(format!("invalid hash in index line: {e}")))?;
    let actual = Hasher::hash_object(expected.algorithm(), "blob", postimage)
        .map_err(|e| ApplyError::Semantic(e.to_string()))?;
    if actual != expected {
        return Err(ApplyError::BinaryHashMismatch {
            path: path.to_string(),
            expected: expected_hex.to_string(),
            actual: actual.to_hex(),
        });
    }
    Ok(())
}

/// Hash arbitrary content for index updates after a text-hunk apply.
pub fn hash_blob(algo: HashAlgorithm, content: &[u8]) -> Result<ObjectId> {
    Hasher::hash_object(algo, "blob", content).map_err(|e| ApplyError::Semantic(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base85::deflate;

    #[test]
    fn literal_replacement_ignores_preimage() {
        let payload = b"new file contents";
        let hunk = BinaryHunk {
            method: BinaryMethod::LiteralDeflated,
            deflated_payload: deflate(payload),
            original_length: payload.len(),
        };
        let out = apply_binary_hunk(b"old contents", &hunk).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn hash_mismatch_is_rejected() {
        let content = b"hello";
        let oid = hash_blob(HashAlgorithm::Sha1, content).unwrap();
        assert!(verify_postimage_hash("f", content, &oid.to_hex()).is_ok());
        assert!(verify_postimage_hash("f", b"different", &oid.to_hex()).is_err());
    }
}
