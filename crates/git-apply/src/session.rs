//! Run-scoped configuration and mutable state, replacing the module-level
//! globals the original C implementation keeps.

use std::collections::HashMap;

use bstr::BString;

use crate::patch::Patch;
use crate::whitespace::{WsErrorTracker, WsMode};

/// Options collected from the CLI surface, threaded through the parser,
/// locator and file-state manager for the duration of one run.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub p_value: Option<usize>,
    pub p_context: usize,
    pub unidiff_zero: bool,
    pub inaccurate_eof: bool,
    pub recount: bool,
    pub whitespace: WsMode,
    pub no_add: bool,
    pub apply_in_reverse: bool,
    pub apply_with_reject: bool,
    pub cached: bool,
    pub check_only: bool,
    pub update_index: bool,
    pub directory: Option<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub ws_squelch: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            p_value: None,
            p_context: usize::MAX,
            unidiff_zero: false,
            inaccurate_eof: false,
            recount: false,
            whitespace: WsMode::Warn,
            no_add: false,
            apply_in_reverse: false,
            apply_with_reject: false,
            cached: false,
            check_only: false,
            update_index: false,
            directory: None,
            include: Vec::new(),
            exclude: Vec::new(),
            ws_squelch: 5,
        }
    }
}

/// A path's status in the cross-patch state table maintained by the
/// file-state manager.
#[derive(Debug, Clone)]
pub enum PathStatus {
    /// An earlier patch in this run produced a postimage for this path.
    Patched(usize),
    /// An earlier patch deleted or renamed-away this path.
    WasDeleted,
    /// A later patch in this run will delete or rename-away this path; set
    /// during the prepare phase so creates-over-deletes can be sequenced.
    ToBeDeleted,
}

/// Everything a run needs beyond the per-patch parse results: configuration,
/// the path state table, and error accounting.
pub struct ApplySession {
    pub options: ApplyOptions,
    pub linenr: usize,
    pub ws_tracker: WsErrorTracker,
    pub any_hunk_failed: bool,
    path_state: HashMap<BString, PathStatus>,
}

impl ApplySession {
    pub fn new(options: ApplyOptions) -> Self {
        let squelch = options.ws_squelch;
        Self {
            options,
            linenr: 0,
            ws_tracker: WsErrorTracker::new(squelch),
            any_hunk_failed: false,
            path_state: HashMap::new(),
        }
    }

    pub fn status_of(&self, path: &BString) -> Option<&PathStatus> {
        self.path_state.get(path)
    }

    pub fn mark_to_be_deleted(&mut self, path: BString) {
        self.path_state.insert(path, PathStatus::ToBeDeleted);
    }

    pub fn mark_patched(&mut self, path: BString, patch_index: usize) {
        self.path_state.insert(path, PathStatus::Patched(patch_index));
    }

    pub fn mark_was_deleted(&mut self, path: BString) {
        self.path_state.insert(path, PathStatus::WasDeleted);
    }

    /// Populate the `ToBeDeleted` entries by scanning the full patch list
    /// once up front, before any patch is applied. This lets a later
    /// creation at the same path (a type change expressed as delete+add)
    /// succeed even though the deletion patch runs after it in the write-out
    /// order.
    pub fn prepare(&mut self, patches: &[Patch]) {
        for patch in patches {
            let goes_away = patch.is_rename || patch.new_path.is_none();
            if goes_away {
                if let Some(old) = &patch.old_path {
                    self.mark_to_be_deleted(old.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_marks_renamed_and_deleted_paths() {
        let mut session = ApplySession::new(ApplyOptions::default());
        let mut p1 = Patch::new();
        p1.old_path = Some(BString::from("a.txt"));
        p1.new_path = Some(BString::from("b.txt"));
        p1.is_rename = true;

        let mut p2 = Patch::new();
        p2.old_path = Some(BString::from("c.txt"));
        p2.new_path = None;

        session.prepare(&[p1, p2]);
        assert!(matches!(
            session.status_of(&BString::from("a.txt")),
            Some(PathStatus::ToBeDeleted)
        ));
        assert!(matches!(
            session.status_of(&BString::from("c.txt")),
            Some(PathStatus::ToBeDeleted)
        ));
    }
}
