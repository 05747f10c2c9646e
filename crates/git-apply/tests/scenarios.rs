//! End-to-end scenarios (S1-S6) and the testable-property checks, driven
//! entirely through the crate's public `apply`/`apply_with_index` entry
//! points against real `tempfile::tempdir()` working trees.

use std::fs;

use git_apply::session::{ApplyOptions, ApplySession, PathStatus};
use git_apply::whitespace::WsMode;
use git_apply::{apply, ApplyError};

fn session(opts: ApplyOptions) -> ApplySession {
    ApplySession::new(opts)
}

#[test]
fn s1_add_a_line_at_end_with_exact_match() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("f.txt"), b"a\nb\n").unwrap();

    let patch = b"diff --git a/f.txt b/f.txt\n\
--- a/f.txt\n\
+++ b/f.txt\n\
@@ -1,2 +1,3 @@\n\
 a\n\
 b\n\
+c\n";

    let mut sess = session(ApplyOptions::default());
    apply(patch, &mut sess, dir.path()).unwrap();

    assert_eq!(fs::read(dir.path().join("f.txt")).unwrap(), b"a\nb\nc\n");
}

#[test]
fn s2_fuzzy_whitespace_match_under_whitespace_fix() {
    let dir = tempfile::tempdir().unwrap();
    // Trailing spaces on the first line that the patch's context doesn't carry.
    fs::write(dir.path().join("f.txt"), b"a  \nb\n").unwrap();

    let patch = b"diff --git a/f.txt b/f.txt\n\
--- a/f.txt\n\
+++ b/f.txt\n\
@@ -1,2 +1,3 @@\n\
 a\n\
 b\n\
+c\n";

    let mut opts = ApplyOptions::default();
    opts.whitespace = WsMode::Fix;
    let mut sess = session(opts);
    apply(patch, &mut sess, dir.path()).unwrap();

    // Exact match would have failed (disk line carries trailing spaces the
    // patch's context doesn't); the fuzzy match succeeds and the postimage
    // carries the fixed-up form of the context line.
    assert_eq!(fs::read(dir.path().join("f.txt")).unwrap(), b"a\nb\nc\n");
}

#[test]
fn s3_context_reduction_falls_back_when_trailing_context_mismatches() {
    let dir = tempfile::tempdir().unwrap();
    // Only the first three lines match the patch's declared preimage; the
    // three lines the patch expects as trailing context have since diverged.
    fs::write(dir.path().join("f.txt"), b"a\nb\nc\nM\nN\nO\n").unwrap();

    let patch = b"diff --git a/f.txt b/f.txt\n\
--- a/f.txt\n\
+++ b/f.txt\n\
@@ -1,6 +1,7 @@\n\
 a\n\
 b\n\
 c\n\
+X\n\
 d\n\
 e\n\
 f\n";

    // -C0 / fuzz off: no context-reduction fallback, so this fails outright.
    let mut opts_strict = ApplyOptions::default();
    opts_strict.p_context = 0;
    let mut sess_strict = session(opts_strict);
    assert!(apply(patch, &mut sess_strict, dir.path()).is_err());
    // The file on disk must be untouched by the failed attempt.
    assert_eq!(fs::read(dir.path().join("f.txt")).unwrap(), b"a\nb\nc\nM\nN\nO\n");

    // Default p_context = infinite: trailing context reduces to 0 and the
    // hunk applies against just the leading three lines.
    let mut sess_fuzzy = session(ApplyOptions::default());
    apply(patch, &mut sess_fuzzy, dir.path()).unwrap();
    assert_eq!(fs::read(dir.path().join("f.txt")).unwrap(), b"a\nb\nc\nX\nM\nN\nO\n");
}

#[test]
fn s4_rename_with_modification_sees_in_memory_postimage() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"line1\nold2\n").unwrap();
    // Stale on-disk content at the rename target: if the second patch fell
    // back to reading this instead of the first patch's in-memory result,
    // its hunk wouldn't locate.
    fs::write(dir.path().join("b.txt"), b"unrelated stale contents\n").unwrap();

    let patch = b"diff --git a/a.txt b/b.txt\n\
rename from a.txt\n\
rename to b.txt\n\
--- a/a.txt\n\
+++ b/b.txt\n\
@@ -1,2 +1,2 @@\n\
 line1\n\
-old2\n\
+new2\n\
diff --git a/b.txt b/b.txt\n\
--- a/b.txt\n\
+++ b/b.txt\n\
@@ -1,2 +1,2 @@\n\
 line1\n\
-new2\n\
+new3\n";

    let mut sess = session(ApplyOptions::default());
    apply(patch, &mut sess, dir.path()).unwrap();

    assert!(!dir.path().join("a.txt").exists());
    assert_eq!(fs::read(dir.path().join("b.txt")).unwrap(), b"line1\nnew3\n");
}

#[test]
fn s5_binary_replacement_and_unreversible_reverse() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bin.dat"), b"whatever was here before").unwrap();

    let payload = b"xyz";
    let deflated = git_apply::base85::deflate(payload);
    let encoded = git_apply::base85::encode(&deflated);

    // new-side hash is the blob hash of "xyz" (sha1("blob 3\0xyz")); the binary
    // postimage check requires it to match exactly.
    let mut patch = Vec::new();
    patch.extend_from_slice(
        b"diff --git a/bin.dat b/bin.dat\n\
index 0000000000000000000000000000000000000000..d66d9d758f74e0849d7e0b9a39dcf29b07179124 100644\n\
GIT binary patch\nliteral 3\n",
    );
    patch.extend_from_slice(&encoded);
    patch.push(b'\n');

    let mut sess = session(ApplyOptions::default());
    apply(&patch, &mut sess, dir.path()).unwrap();
    assert_eq!(fs::read(dir.path().join("bin.dat")).unwrap(), b"xyz");

    // No reverse hunk was present in this patch, so reverse-apply must fail.
    let mut opts = ApplyOptions::default();
    opts.apply_in_reverse = true;
    let mut sess_rev = session(opts);
    let err = apply(&patch, &mut sess_rev, dir.path()).unwrap_err();
    assert!(matches!(err, ApplyError::BinaryNotReversible { .. }));
}

#[test]
fn s6_reject_file_for_unlocatable_middle_hunk() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("nums.txt"),
        b"h1\nh2\nh3\nh4\nh5\nh6\nh7\nh8\nh9\n",
    )
    .unwrap();

    let patch = b"diff --git a/nums.txt b/nums.txt\n\
--- a/nums.txt\n\
+++ b/nums.txt\n\
@@ -1,2 +1,2 @@\n\
 h1\n\
-h2\n\
+H2\n\
@@ -5,1 +5,1 @@\n\
-nonexistent\n\
+replacement\n\
@@ -8,2 +8,2 @@\n\
 h8\n\
-h9\n\
+H9\n";

    let mut opts = ApplyOptions::default();
    opts.apply_with_reject = true;
    let mut sess = session(opts);
    apply(patch, &mut sess, dir.path()).unwrap();

    assert!(sess.any_hunk_failed);
    assert_eq!(
        fs::read(dir.path().join("nums.txt")).unwrap(),
        b"h1\nH2\nh3\nh4\nh5\nh6\nh7\nh8\nH9\n"
    );

    let reject = fs::read(dir.path().join("nums.txt.rej")).unwrap();
    assert!(reject.windows(b"-nonexistent".len()).any(|w| w == b"-nonexistent"));
    assert!(reject.windows(b"+replacement".len()).any(|w| w == b"+replacement"));
}

// --- Testable-property checks (SPEC_FULL.md section 8) -------------------

#[test]
fn property_round_trip_forward_then_reverse() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("f.txt"), b"one\ntwo\nthree\n").unwrap();

    let patch = b"diff --git a/f.txt b/f.txt\n\
--- a/f.txt\n\
+++ b/f.txt\n\
@@ -1,3 +1,3 @@\n\
 one\n\
-two\n\
+TWO\n\
 three\n";

    let mut sess = session(ApplyOptions::default());
    apply(patch, &mut sess, dir.path()).unwrap();
    assert_eq!(fs::read(dir.path().join("f.txt")).unwrap(), b"one\nTWO\nthree\n");

    let mut opts = ApplyOptions::default();
    opts.apply_in_reverse = true;
    let mut sess_rev = session(opts);
    apply(patch, &mut sess_rev, dir.path()).unwrap();
    assert_eq!(fs::read(dir.path().join("f.txt")).unwrap(), b"one\ntwo\nthree\n");
}

#[test]
fn property_hash_stability_across_line_image_edits() {
    use git_apply::lineimage::{hash_line, LineImage};

    let mut img = LineImage::from_bytes(b"one\ntwo\nthree\n".to_vec());
    img.remove_first_line();

    let sum: usize = img.lines.iter().map(|l| l.len).sum();
    assert_eq!(sum, img.buf.len());

    let mut offset = 0;
    for line in &img.lines {
        let recomputed = hash_line(&img.buf[offset..offset + line.len]);
        assert_eq!(recomputed, line.hash24);
        offset += line.len;
    }
}

#[test]
fn property_context_reduction_never_enlarges_declared_context() {
    use git_apply::locate::apply_hunk;
    use git_apply::lineimage::LineImage;
    use git_apply::patch::{Hunk, HunkLine};
    use git_apply::whitespace::WsRuleSet;
    use bstr::BString;

    let mut img = LineImage::from_bytes(b"a\nb\nc\nM\nN\nO\n".to_vec());
    let hunk = Hunk {
        old_pos: 1,
        old_lines: 6,
        new_pos: 1,
        new_lines: 7,
        leading_context: 3,
        trailing_context: 3,
        body: vec![
            HunkLine::Context(BString::from("a")),
            HunkLine::Context(BString::from("b")),
            HunkLine::Context(BString::from("c")),
            HunkLine::Add(BString::from("X")),
            HunkLine::Context(BString::from("d")),
            HunkLine::Context(BString::from("e")),
            HunkLine::Context(BString::from("f")),
        ],
        rejected: false,
    };

    let sess = session(ApplyOptions::default());
    let outcome = apply_hunk(&mut img, &hunk, &sess, &WsRuleSet::default());
    assert!(outcome.applied);
    assert!(outcome.trailing_reduced);
    assert!(!outcome.leading_reduced);
}

#[test]
fn property_whitespace_fix_never_grows_a_line() {
    use git_apply::whitespace::{ws_fix_copy, WsRuleSet};

    let mut out = Vec::new();
    let src = b"trailing space here   \n";
    let n = ws_fix_copy(&mut out, src, &WsRuleSet::default());
    assert!(n <= src.len());
}

#[test]
fn property_write_out_never_creates_before_a_same_path_delete_is_processed() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"content\n").unwrap();

    // A type-change expressed as a delete of a.txt followed (later in the
    // stream) by a fresh creation at the same path.
    let patch = b"diff --git a/a.txt b/a.txt\n\
deleted file mode 100644\n\
--- a/a.txt\n\
+++ /dev/null\n\
@@ -1,1 +0,0 @@\n\
-content\n\
diff --git a/a.txt b/a.txt\n\
new file mode 100644\n\
--- /dev/null\n\
+++ b/a.txt\n\
@@ -0,0 +1,1 @@\n\
+replacement\n";

    let mut sess = session(ApplyOptions::default());
    apply(patch, &mut sess, dir.path()).unwrap();

    assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"replacement\n");
    assert!(matches!(
        sess.status_of(&bstr::BString::from("a.txt")),
        Some(PathStatus::Patched(_))
    ));
}

#[test]
fn property_idempotent_reparse_preserves_hunk_header_counts() {
    use git_apply::parser::parse_patches;
    use git_apply::patch::HunkKind;

    let patch = b"diff --git a/f.txt b/f.txt\n\
--- a/f.txt\n\
+++ b/f.txt\n\
@@ -1,2 +1,3 @@\n\
 a\n\
 b\n\
+c\n";

    let mut sess = session(ApplyOptions::default());
    let patches = parse_patches(patch, &mut sess).unwrap();
    let HunkKind::Text(hunks) = &patches[0].hunks else { panic!("expected text hunk") };
    assert_eq!(hunks[0].old_pos, 1);
    assert_eq!(hunks[0].old_lines, 2);
    assert_eq!(hunks[0].new_pos, 1);
    assert_eq!(hunks[0].new_lines, 3);
}
