//! The parsed representation of a single file's change: [`Patch`], its
//! [`Hunk`]s, and the whitespace rule attached to it.

use bstr::BString;

use crate::whitespace::WsRuleSet;

/// Tri-state used for "is this a new/deleted file" flags that start out
/// unknown until the body of the patch confirms or denies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tri {
    Unknown,
    No,
    Yes,
}

impl Tri {
    pub fn is_yes(self) -> bool {
        matches!(self, Tri::Yes)
    }
}

/// Method used to encode a binary hunk's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryMethod {
    LiteralDeflated,
    DeltaDeflated,
}

/// A binary hunk: a complete replacement or delta payload for the file,
/// deflate-compressed and base85-encoded in the patch text.
#[derive(Debug, Clone)]
pub struct BinaryHunk {
    pub method: BinaryMethod,
    pub deflated_payload: Vec<u8>,
    pub original_length: usize,
}

/// A single body line of a text hunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(BString),
    Add(BString),
    Remove(BString),
    /// `\ No newline at end of file` marker attached to the preceding line.
    NoNewlineMarker,
}

/// A single `@@ -a,b +c,d @@` hunk and its body.
#[derive(Debug, Clone)]
pub struct Hunk {
    pub old_pos: usize,
    pub old_lines: usize,
    pub new_pos: usize,
    pub new_lines: usize,
    pub leading_context: usize,
    pub trailing_context: usize,
    pub body: Vec<HunkLine>,
    pub rejected: bool,
}

/// Either kind of hunk a patch can carry.
#[derive(Debug, Clone)]
pub enum HunkKind {
    Text(Vec<Hunk>),
    Binary {
        forward: BinaryHunk,
        reverse: Option<BinaryHunk>,
    },
}

/// A single file's change, as recovered from the patch stream.
#[derive(Debug, Clone)]
pub struct Patch {
    pub old_path: Option<BString>,
    pub new_path: Option<BString>,
    /// Path recovered from the `diff --git a/X b/X` line, used when no
    /// other header supplied a name (pure mode-change, empty add).
    pub def_path: Option<BString>,
    pub old_mode: u32,
    pub new_mode: u32,
    pub is_new: Tri,
    pub is_delete: Tri,
    pub is_rename: bool,
    pub is_copy: bool,
    pub inaccurate_eof: bool,
    pub recount: bool,
    pub old_hash_prefix: Option<String>,
    pub new_hash_prefix: Option<String>,
    pub ws_rule: WsRuleSet,
    pub hunks: HunkKind,
    /// Postimage bytes, filled in once the Applier has processed this patch.
    pub result_bytes: Option<Vec<u8>>,
}

impl Patch {
    pub fn new() -> Self {
        Self {
            old_path: None,
            new_path: None,
            def_path: None,
            old_mode: 0,
            new_mode: 0,
            is_new: Tri::Unknown,
            is_delete: Tri::Unknown,
            is_rename: false,
            is_copy: false,
            inaccurate_eof: false,
            recount: false,
            old_hash_prefix: None,
            new_hash_prefix: None,
            ws_rule: WsRuleSet::default(),
            hunks: HunkKind::Text(Vec::new()),
            result_bytes: None,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.hunks, HunkKind::Binary { .. })
    }

    /// The path to use when resolving this patch against the working tree
    /// or index, preferring the postimage path.
    pub fn target_path(&self) -> Option<&BString> {
        self.new_path.as_ref().or(self.old_path.as_ref()).or(self.def_path.as_ref())
    }
}

impl Default for Patch {
    fn default() -> Self {
        Self::new()
    }
}
