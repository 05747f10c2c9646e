//! `--build-fake-ancestor`: reconstruct a blob containing each patched
//! file's preimage, so a three-way merge tool downstream has something to
//! diff against even when the real ancestor commit isn't available.

use std::io::Write as IoWrite;
use std::path::Path;

use git_odb::ObjectDatabase;

use crate::binary::hash_blob;
use crate::error::Result;
use crate::patch::Patch;

/// One entry of the fake-ancestor tree: a path and the blob id of its
/// preimage, as recovered while the patches were parsed (not yet applied).
pub struct FakeAncestorEntry {
    pub path: String,
    pub oid: git_hash::ObjectId,
}

/// Hash every patch's preimage (the old side of a text hunk set) into the
/// object database and return the resulting path/oid pairs, without
/// touching the working tree or index. Binary patches contribute nothing:
/// there is no reconstructable preimage without actually applying them.
pub fn build_fake_ancestor(
    patches: &[Patch],
    preimages: &[(String, Vec<u8>)],
    odb: &ObjectDatabase,
) -> Result<Vec<FakeAncestorEntry>> {
    let algo = odb.hash_algo();
    let mut entries = Vec::new();
    for patch in patches {
        let Some(path) = patch.old_path.as_ref() else { continue };
        let path_str = path.to_string();
        let Some((_, content)) = preimages.iter().find(|(p, _)| *p == path_str) else { continue };
        let oid = hash_blob(algo, content)?;
        odb.write_raw(git_object::ObjectType::Blob, content)?;
        entries.push(FakeAncestorEntry { path: path_str, oid });
    }
    Ok(entries)
}

/// Write a minimal index-like listing of `path oid` pairs to `out_path`, one
/// per line, for tooling that wants a flat fake-ancestor manifest instead of
/// a real tree object.
pub fn write_manifest(entries: &[FakeAncestorEntry], out_path: &Path) -> Result<()> {
    let mut out = std::fs::File::create(out_path)?;
    for entry in entries {
        writeln!(out, "{} {}", entry.oid.to_hex(), entry.path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{HunkKind, Tri};
    use bstr::BString;

    fn patch_with_old_path(path: &str) -> Patch {
        let mut p = Patch::new();
        p.old_path = Some(BString::from(path));
        p.new_path = Some(BString::from(path));
        p.is_new = Tri::No;
        p.hunks = HunkKind::Text(Vec::new());
        p
    }

    #[test]
    fn builds_one_entry_per_patch_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();
        let patches = vec![patch_with_old_path("a.txt")];
        let preimages = vec![("a.txt".to_string(), b"hello\n".to_vec())];
        let entries = build_fake_ancestor(&patches, &preimages, &odb).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "a.txt");
    }

    #[test]
    fn skips_patches_without_a_matching_preimage() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();
        let patches = vec![patch_with_old_path("missing.txt")];
        let entries = build_fake_ancestor(&patches, &[], &odb).unwrap();
        assert!(entries.is_empty());
    }
}
