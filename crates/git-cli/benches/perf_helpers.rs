//! Shared helpers for the `apply` performance comparison benchmark.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Discover the path to the compiled `gitr` binary.
///
/// When run via `cargo bench`, the binary lives two directories up from
/// the benchmark executable in `target/release/deps/`.
pub fn gitr_bin() -> PathBuf {
    let mut path = std::env::current_exe()
        .unwrap()
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf();
    path.push("gitr");
    path
}

/// Apply deterministic environment variables to a `Command`.
fn pin_env(cmd: &mut Command) {
    cmd.env("TZ", "UTC").env("LC_ALL", "C").env("LANG", "C");
}

/// Run C git's `apply` in `dir` against `patch` fed on stdin.
pub fn run_git_apply(dir: &Path, args: &[&str], patch: &[u8]) {
    run_apply(Command::new("git"), dir, args, patch);
}

/// Run gitr's `apply` in `dir` against `patch` fed on stdin.
pub fn run_gitr_apply(dir: &Path, args: &[&str], patch: &[u8]) {
    run_apply(Command::new(gitr_bin()), dir, args, patch);
}

fn run_apply(mut cmd: Command, dir: &Path, args: &[&str], patch: &[u8]) {
    let mut full_args = vec!["apply"];
    full_args.extend_from_slice(args);
    cmd.args(&full_args)
        .current_dir(dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    pin_env(&mut cmd);
    let mut child = cmd.spawn().expect("failed to spawn apply");
    {
        use std::io::Write;
        child.stdin.take().unwrap().write_all(patch).unwrap();
    }
    child.wait().expect("failed to wait on apply");
}

/// Size preset for generated patches.
#[derive(Clone, Copy)]
pub enum PatchSize {
    /// A single hunk changing one line in a small file.
    SingleHunk,
    /// Many scattered hunks across a larger file.
    ManyHunks,
}

impl PatchSize {
    pub fn label(self) -> &'static str {
        match self {
            PatchSize::SingleHunk => "single_hunk",
            PatchSize::ManyHunks => "many_hunks",
        }
    }

    fn line_count(self) -> usize {
        match self {
            PatchSize::SingleHunk => 20,
            PatchSize::ManyHunks => 2_000,
        }
    }

    fn hunk_count(self) -> usize {
        match self {
            PatchSize::SingleHunk => 1,
            PatchSize::ManyHunks => 100,
        }
    }
}

/// Original content for a `PatchSize` preset: numbered lines.
pub fn original_content(size: PatchSize) -> String {
    (0..size.line_count())
        .map(|i| format!("line {i}\n"))
        .collect()
}

/// A unified-diff patch that upper-cases every `step`-th line of
/// `original_content(size)`, spread across `size.hunk_count()` hunks.
pub fn build_patch(path: &str, size: PatchSize) -> Vec<u8> {
    let lines = size.line_count();
    let hunks = size.hunk_count();
    let step = std::cmp::max(1, lines / hunks);

    let mut out = format!("diff --git a/{path} b/{path}\n--- a/{path}\n+++ b/{path}\n");
    for start in (0..lines).step_by(step) {
        if start + 2 >= lines {
            break;
        }
        let changed = start + 1;
        out.push_str(&format!("@@ -{},3 +{},3 @@\n", start + 1, start + 1));
        out.push_str(&format!(" line {start}\n"));
        out.push_str(&format!("-line {changed}\n"));
        out.push_str(&format!("+LINE {changed}\n"));
        out.push_str(&format!(" line {}\n", start + 2));
    }
    out.into_bytes()
}
