//! Patch parsing, hunk location, and hunk application — the engine behind
//! `git apply`: turning unified-diff or git-extended patch text into
//! changes against a working tree and/or index.

pub mod base85;
pub mod binary;
pub mod error;
pub mod fakeancestor;
pub mod filestate;
pub mod lineimage;
pub mod locate;
pub mod parser;
pub mod patch;
pub mod session;
pub mod whitespace;

pub use error::{ApplyError, Result};
pub use parser::parse_patches;
pub use patch::Patch;
pub use session::{ApplyOptions, ApplySession};

use std::path::Path;

use git_index::Index;
use git_odb::ObjectDatabase;

/// Parse a patch stream and apply every patch it contains against
/// `work_tree`, honoring whatever reject/check/cached flags are set on
/// `session.options`. This is the single entry point CLI code needs.
pub fn apply(input: &[u8], session: &mut ApplySession, work_tree: &Path) -> Result<Vec<Patch>> {
    apply_with_index(input, session, work_tree, None, None)
}

/// Same as [`apply`], but also updates `index` (and hashes blobs into
/// `odb`) when `session.options.update_index` is set — the path taken by
/// `--index` and `--cached`.
pub fn apply_with_index(
    input: &[u8],
    session: &mut ApplySession,
    work_tree: &Path,
    index: Option<&mut Index>,
    odb: Option<&ObjectDatabase>,
) -> Result<Vec<Patch>> {
    let mut patches = parser::parse_patches(input, session)?;
    patches.retain(|p| path_is_selected(p, session));
    if session.options.apply_in_reverse {
        reverse_patches(&mut patches);
    }
    filestate::apply_patches(&mut patches, session, work_tree, index, odb)?;
    Ok(patches)
}

/// Whether a patch's target path survives the `--include`/`--exclude`
/// filename filters: selected unless `include` is non-empty and nothing in
/// it matches, or `exclude` matches. Unlike the upstream implementation's
/// single interleaved pattern list, `include` and `exclude` are tracked
/// separately here (see `ApplyOptions`), so relative ordering between an
/// include and a later exclude naming the same file isn't preserved —
/// exclude always wins over include for a given path.
fn path_is_selected(patch: &Patch, session: &ApplySession) -> bool {
    let Some(path) = patch.target_path() else {
        return true;
    };
    let path = bstr::ByteSlice::to_str_lossy(path.as_slice());

    if !session.options.exclude.is_empty()
        && session
            .options
            .exclude
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .any(|pat| pat.matches(&path))
    {
        return false;
    }

    if session.options.include.is_empty() {
        return true;
    }

    session
        .options
        .include
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .any(|pat| pat.matches(&path))
}

/// Swap old/new sides of every patch in place, used by `--reverse`.
fn reverse_patches(patches: &mut [Patch]) {
    use crate::patch::{HunkKind, HunkLine};

    for patch in patches.iter_mut() {
        std::mem::swap(&mut patch.old_path, &mut patch.new_path);
        std::mem::swap(&mut patch.old_mode, &mut patch.new_mode);
        std::mem::swap(&mut patch.old_hash_prefix, &mut patch.new_hash_prefix);
        std::mem::swap(&mut patch.is_new, &mut patch.is_delete);

        match &mut patch.hunks {
            HunkKind::Text(hunks) => {
                for hunk in hunks.iter_mut() {
                    std::mem::swap(&mut hunk.old_pos, &mut hunk.new_pos);
                    std::mem::swap(&mut hunk.old_lines, &mut hunk.new_lines);
                    for line in hunk.body.iter_mut() {
                        *line = match std::mem::replace(line, HunkLine::NoNewlineMarker) {
                            HunkLine::Add(s) => HunkLine::Remove(s),
                            HunkLine::Remove(s) => HunkLine::Add(s),
                            other => other,
                        };
                    }
                }
            }
            HunkKind::Binary { forward, reverse } => {
                if let Some(rev) = reverse.take() {
                    *reverse = Some(std::mem::replace(forward, rev));
                }
            }
        }
    }
}
