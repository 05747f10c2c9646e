//! File-State Manager: resolves preimages, drives the locator/applier per
//! patch, and writes results out to the working tree and/or index.
//!
//! Three phases, matching `apply_patches` in the original implementation:
//! prepare (mark paths that will go away so a later create-over-delete at
//! the same path still succeeds), check-and-apply (entirely in memory, so a
//! failure midway never leaves the working tree half-patched), write-out
//! (deletions first, then creations/modifications).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use bstr::{BString, ByteSlice};
use git_index::{EntryFlags, Index, IndexEntry, Stage};
use git_object::FileMode;
use git_odb::ObjectDatabase;
use git_utils::lockfile::LockFile;

use crate::binary::{apply_binary_hunk, hash_blob, verify_postimage_hash};
use crate::error::{ApplyError, Result};
use crate::lineimage::LineImage;
use crate::locate::apply_hunk;
use crate::patch::{HunkKind, Patch, Tri};
use crate::session::{ApplySession, PathStatus};
use crate::whitespace::{ws_check, WsMode};

/// Where a patch's preimage came from, needed to decide whether "file does
/// not exist" is actually an error.
enum Preimage {
    Bytes(Vec<u8>),
    Missing,
}

/// One patch's outcome after the in-memory check-and-apply phase.
struct Planned {
    path: BString,
    action: Action,
    reject: Option<Vec<u8>>,
}

enum Action {
    Write(Vec<u8>),
    Delete,
}

/// Run a full apply pass over `patches`, mutating `session` state as it
/// goes. Returns `Ok(())` if every patch applied (or was diverted to a
/// `.rej` file under `--reject`); returns the first hard error otherwise.
pub fn apply_patches(
    patches: &mut [Patch],
    session: &mut ApplySession,
    work_tree: &Path,
    index: Option<&mut Index>,
    odb: Option<&ObjectDatabase>,
) -> Result<()> {
    session.prepare(patches);

    let mut in_run_results: HashMap<BString, Vec<u8>> = HashMap::new();
    let mut planned = Vec::with_capacity(patches.len());
    for (i, patch) in patches.iter_mut().enumerate() {
        let path = patch
            .target_path()
            .cloned()
            .ok_or_else(|| ApplyError::Semantic("patch has no resolvable path".into()))?;

        let preimage = resolve_preimage(patch, session, &in_run_results, work_tree, index.as_deref(), odb)?;
        let plan = check_and_apply_one(i, &path, patch, preimage, session)?;
        if let Action::Write(bytes) = &plan.action {
            in_run_results.insert(path.clone(), bytes.clone());
        }

        if patch.is_rename && !patch.is_copy {
            if let Some(old_path) = &patch.old_path {
                if old_path != &path {
                    session.mark_was_deleted(old_path.clone());
                    planned.push(Planned { path: old_path.clone(), action: Action::Delete, reject: None });
                }
            }
        }

        planned.push(plan);
    }

    if session.any_hunk_failed && !session.options.apply_with_reject {
        return Err(ApplyError::HunkFailed { path: "one or more files".into() });
    }

    if session.options.check_only {
        return check_whitespace_errors(session);
    }

    write_out(&planned, session, work_tree, index, odb)?;
    check_whitespace_errors(session)
}

/// `--whitespace=error[-all]`: the run completes application (or, under
/// `--check`, the full check-and-apply pass) and only then fails if any
/// whitespace violation was recorded along the way.
fn check_whitespace_errors(session: &ApplySession) -> Result<()> {
    if matches!(session.options.whitespace, WsMode::Error | WsMode::ErrorAll) && session.ws_tracker.count > 0 {
        return Err(ApplyError::WhitespaceErrors { count: session.ws_tracker.count });
    }
    Ok(())
}

fn resolve_preimage(
    patch: &Patch,
    session: &ApplySession,
    in_run_results: &HashMap<BString, Vec<u8>>,
    work_tree: &Path,
    index: Option<&Index>,
    odb: Option<&ObjectDatabase>,
) -> Result<Preimage> {
    if matches!(patch.is_new, Tri::Yes) {
        return Ok(Preimage::Missing);
    }

    let Some(old_path) = &patch.old_path else { return Ok(Preimage::Missing) };

    if matches!(session.status_of(old_path), Some(PathStatus::Patched(_))) {
        if let Some(bytes) = in_run_results.get(old_path) {
            return Ok(Preimage::Bytes(bytes.clone()));
        }
    }

    if session.options.cached {
        let index = index.ok_or_else(|| ApplyError::Semantic("--cached requires an index".into()))?;
        let entry = index
            .get(old_path.as_ref(), Stage::Normal)
            .ok_or_else(|| ApplyError::Semantic(format!("{old_path}: does not exist in index")))?;
        let odb = odb.ok_or_else(|| ApplyError::Semantic("--cached requires an object database".into()))?;
        let obj = odb
            .read(&entry.oid)?
            .ok_or_else(|| ApplyError::Semantic(format!("{old_path}: blob missing from object database")))?;
        return Ok(Preimage::Bytes(blob_bytes(obj)));
    }

    let disk_path = work_tree.join(old_path.to_path_lossy());
    match fs::read(&disk_path) {
        Ok(bytes) => Ok(Preimage::Bytes(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Preimage::Missing),
        Err(e) => Err(e.into()),
    }
}

fn blob_bytes(obj: git_object::Object) -> Vec<u8> {
    match obj {
        git_object::Object::Blob(b) => b.data,
        _ => Vec::new(),
    }
}

fn check_and_apply_one(
    index_in_run: usize,
    path: &BString,
    patch: &mut Patch,
    preimage: Preimage,
    session: &mut ApplySession,
) -> Result<Planned> {
    if matches!(patch.is_delete, Tri::Yes) {
        session.mark_was_deleted(path.clone());
        return Ok(Planned { path: path.clone(), action: Action::Delete, reject: None });
    }

    let preimage_bytes = match preimage {
        Preimage::Bytes(b) => b,
        Preimage::Missing => {
            if !matches!(patch.is_new, Tri::Yes) && !session.options.no_add {
                return Err(ApplyError::Semantic(format!("{path}: No such file or directory")));
            }
            Vec::new()
        }
    };

    let mut reject = None;
    let postimage_bytes = match &patch.hunks {
        HunkKind::Text(hunks) => {
            let hunks = hunks.clone();
            let (bytes, rej) = apply_text_hunks(&hunks, &preimage_bytes, patch, session)?;
            reject = rej;
            bytes
        }
        HunkKind::Binary { forward, reverse } => {
            let active = if session.options.apply_in_reverse {
                reverse.as_ref().ok_or_else(|| ApplyError::BinaryNotReversible { path: path.to_string() })?
            } else {
                forward
            };
            let out = apply_binary_hunk(&preimage_bytes, active)?;
            let expected = patch.new_hash_prefix.as_ref().ok_or_else(|| {
                ApplyError::Semantic(format!("{path}: binary patch missing full index hashes"))
            })?;
            verify_postimage_hash(&path.to_string(), &out, expected)?;
            out
        }
    };

    patch.result_bytes = Some(postimage_bytes.clone());
    session.mark_patched(path.clone(), index_in_run);
    Ok(Planned { path: path.clone(), action: Action::Write(postimage_bytes), reject })
}

fn apply_text_hunks(
    hunks: &[crate::patch::Hunk],
    preimage_bytes: &[u8],
    patch: &mut Patch,
    session: &mut ApplySession,
) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
    let mut img = LineImage::from_bytes(preimage_bytes.to_vec());
    let rule = patch.ws_rule;
    let mut rejected_hunks = Vec::new();

    for hunk in hunks {
        if session.options.whitespace != WsMode::Nowarn {
            for line in &hunk.body {
                if let crate::patch::HunkLine::Add(s) = line {
                    let v = ws_check(s, &rule);
                    if !v.is_empty() {
                        session.ws_tracker.record();
                    }
                }
            }
        }

        let outcome = apply_hunk(&mut img, hunk, session, &rule);
        if !outcome.applied {
            session.any_hunk_failed = true;
            let mut h = hunk.clone();
            h.rejected = true;
            rejected_hunks.push(h);
        }
    }

    // `--whitespace=error[-all]` violations are deferred to the end of the
    // whole run (see `apply_patches`) rather than aborting here, so the rest
    // of the patch series still gets a chance to apply.
    if !rejected_hunks.is_empty() && !session.options.apply_with_reject {
        return Err(ApplyError::HunkFailed { path: patch.target_path().map(|p| p.to_string()).unwrap_or_default() });
    }

    let reject = if rejected_hunks.is_empty() {
        None
    } else {
        Some(render_reject(patch, &rejected_hunks))
    };

    Ok((img.buf, reject))
}

/// Render the hunks that failed to apply as a standalone unified-diff
/// fragment, the same shape a `.rej` file carries.
fn render_reject(patch: &Patch, hunks: &[crate::patch::Hunk]) -> Vec<u8> {
    use crate::patch::HunkLine;
    let mut out = Vec::new();
    let old: &[u8] = patch.old_path.as_ref().map(|p| p.as_bytes()).unwrap_or(b"a");
    let new: &[u8] = patch.new_path.as_ref().map(|p| p.as_bytes()).unwrap_or(b"b");
    out.extend_from_slice(b"--- ");
    out.extend_from_slice(old);
    out.push(b'\n');
    out.extend_from_slice(b"+++ ");
    out.extend_from_slice(new);
    out.push(b'\n');
    for hunk in hunks {
        out.extend_from_slice(
            format!(
                "@@ -{},{} +{},{} @@\n",
                hunk.old_pos, hunk.old_lines, hunk.new_pos, hunk.new_lines
            )
            .as_bytes(),
        );
        for line in &hunk.body {
            match line {
                HunkLine::Context(s) => {
                    out.push(b' ');
                    out.extend_from_slice(s);
                    out.push(b'\n');
                }
                HunkLine::Add(s) => {
                    out.push(b'+');
                    out.extend_from_slice(s);
                    out.push(b'\n');
                }
                HunkLine::Remove(s) => {
                    out.push(b'-');
                    out.extend_from_slice(s);
                    out.push(b'\n');
                }
                HunkLine::NoNewlineMarker => {
                    out.extend_from_slice(b"\\ No newline at end of file\n");
                }
            }
        }
    }
    out
}

fn write_out(
    planned: &[Planned],
    session: &ApplySession,
    work_tree: &Path,
    mut index: Option<&mut Index>,
    odb: Option<&ObjectDatabase>,
) -> Result<()> {
    let _lock = if session.options.update_index {
        let index_path = work_tree.join(".git").join("index");
        Some(LockFile::acquire(&index_path)?)
    } else {
        None
    };

    // Deletions first, so a rename that lands on the same path as something
    // being removed elsewhere never collides mid-write-out.
    for item in planned.iter().filter(|p| matches!(p.action, Action::Delete)) {
        if !session.options.cached {
            let target = work_tree.join(item.path.to_path_lossy());
            let _ = fs::remove_file(target);
        }
        if let Some(index) = index.as_deref_mut() {
            index.remove(item.path.as_ref(), Stage::Normal);
        }
    }

    for item in planned {
        if let Some(reject) = &item.reject {
            let reject_path = reject_file_path(work_tree, &item.path);
            if let Some(parent) = reject_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(reject_path, reject)?;
        }

        match &item.action {
            Action::Write(bytes) => {
                if !session.options.cached {
                    let target = work_tree.join(item.path.to_path_lossy());
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&target, bytes)?;
                }
                if let Some(index) = index.as_deref_mut() {
                    if let Some(odb) = odb {
                        let oid = hash_blob(odb.hash_algo(), bytes)?;
                        index.add(IndexEntry {
                            path: item.path.clone(),
                            oid,
                            mode: FileMode::Regular,
                            stage: Stage::Normal,
                            stat: Default::default(),
                            flags: EntryFlags::default(),
                        });
                    }
                }
            }
            Action::Delete => {}
        }
    }

    Ok(())
}

fn reject_file_path(work_tree: &Path, path: &BString) -> PathBuf {
    let mut p = work_tree.join(path.to_path_lossy()).into_os_string();
    p.push(".rej");
    PathBuf::from(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{Hunk, HunkLine};
    use crate::session::ApplyOptions;
    use bstr::BString;

    fn text_patch(old: &str, new: &str, body: Vec<HunkLine>) -> Patch {
        let mut p = Patch::new();
        p.old_path = Some(BString::from(old));
        p.new_path = Some(BString::from(new));
        p.hunks = HunkKind::Text(vec![Hunk {
            old_pos: 1,
            old_lines: 1,
            new_pos: 1,
            new_lines: 1,
            leading_context: 0,
            trailing_context: 0,
            body,
            rejected: false,
        }]);
        p
    }

    #[test]
    fn applies_single_modification_against_disk() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"old\n").unwrap();

        let mut patch = text_patch(
            "a.txt",
            "a.txt",
            vec![HunkLine::Remove(BString::from("old")), HunkLine::Add(BString::from("new"))],
        );
        let mut patches = vec![patch.clone()];
        let mut session = ApplySession::new(ApplyOptions::default());
        apply_patches(&mut patches, &mut session, dir.path(), None, None).unwrap();

        let result = fs::read(dir.path().join("a.txt")).unwrap();
        assert_eq!(result, b"new\n");
        patch.result_bytes = patches[0].result_bytes.clone();
    }

    #[test]
    fn missing_file_without_no_add_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut patches = vec![text_patch(
            "missing.txt",
            "missing.txt",
            vec![HunkLine::Remove(BString::from("old")), HunkLine::Add(BString::from("new"))],
        )];
        let mut session = ApplySession::new(ApplyOptions::default());
        assert!(apply_patches(&mut patches, &mut session, dir.path(), None, None).is_err());
    }
}
