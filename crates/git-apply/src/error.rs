use std::path::PathBuf;

/// Errors produced while parsing or applying a patch stream.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("patch fragment without header at line {line}")]
    FragmentWithoutHeader { line: usize },

    #[error("{line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("{0}")]
    Semantic(String),

    #[error("{path}: patch does not apply")]
    HunkFailed { path: String },

    #[error("{count} line(s) add whitespace errors")]
    WhitespaceErrors { count: usize },

    #[error("{path} already exists in working directory")]
    AlreadyExists { path: PathBuf },

    #[error("cannot reverse-apply a binary patch to {path} without the reverse hunk")]
    BinaryNotReversible { path: String },

    #[error("binary patch to {path} creates incorrect result (expected {expected}, got {actual})")]
    BinaryHashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Index(#[from] git_index::IndexError),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Util(#[from] git_utils::UtilError),
}

pub type Result<T> = std::result::Result<T, ApplyError>;
