//! Hunk location and application: bidirectional hashed search, whitespace
//! fuzz fallback, and context-reduction fallback.

use crate::lineimage::LineImage;
use crate::patch::{Hunk, HunkLine};
use crate::session::ApplySession;
use crate::whitespace::{ws_fix_copy, WsMode, WsRuleSet};

/// Build the preimage and postimage line images for a hunk, plus the list
/// of `(preimage_idx, postimage_idx)` pairs for lines shared as context —
/// needed later to fix up the postimage after a whitespace-fuzzy match.
fn build_images(hunk: &Hunk) -> (LineImage, LineImage, Vec<(usize, usize)>) {
    let mut pre = LineImage::default();
    let mut post = LineImage::default();
    let mut context_pairs = Vec::new();

    for line in &hunk.body {
        match line {
            HunkLine::Context(s) => {
                let pi = push_line(&mut pre, s);
                let qi = push_line(&mut post, s);
                pre.mark_context(pi);
                post.mark_context(qi);
                context_pairs.push((pi, qi));
            }
            HunkLine::Remove(s) => {
                push_line(&mut pre, s);
            }
            HunkLine::Add(s) => {
                push_line(&mut post, s);
            }
            HunkLine::NoNewlineMarker => {}
        }
    }

    (pre, post, context_pairs)
}

fn push_line(img: &mut LineImage, s: &bstr::BString) -> usize {
    let idx = img.nr();
    let mut bytes: Vec<u8> = s.to_vec();
    if !bytes.ends_with(b"\n") {
        bytes.push(b'\n');
    }
    img.buf.extend_from_slice(&bytes);
    img.lines.push(crate::lineimage::LineInfo {
        len: bytes.len(),
        hash24: crate::lineimage::hash_line(&bytes),
        is_context: false,
    });
    idx
}

/// Candidate positions in interleaved forward/backward order around `anchor`.
fn candidate_positions(anchor: usize, max_pos: usize) -> Vec<usize> {
    let anchor = anchor.min(max_pos);
    let mut out = vec![anchor];
    let mut back = anchor;
    let mut fwd = anchor;
    loop {
        let mut moved = false;
        if back > 0 {
            back -= 1;
            out.push(back);
            moved = true;
        }
        if fwd < max_pos {
            fwd += 1;
            out.push(fwd);
            moved = true;
        }
        if !moved {
            break;
        }
    }
    out
}

fn positions_to_try(
    anchor: usize,
    max_pos: usize,
    match_beginning: bool,
    match_end: bool,
) -> Vec<usize> {
    if match_beginning {
        vec![0]
    } else if match_end {
        vec![max_pos]
    } else {
        candidate_positions(anchor, max_pos)
    }
}

fn exact_match_at(img: &LineImage, preimage: &LineImage, pos: usize) -> bool {
    for i in 0..preimage.nr() {
        if img.lines[pos + i].hash24 != preimage.lines[i].hash24 {
            return false;
        }
    }
    img.range_bytes(pos, preimage.nr()) == preimage.buf.as_slice()
}

fn fuzzy_match_at(img: &LineImage, preimage: &LineImage, pos: usize, rule: &WsRuleSet) -> bool {
    let mut a = Vec::new();
    let mut b = Vec::new();
    for i in 0..preimage.nr() {
        a.clear();
        b.clear();
        ws_fix_copy(&mut a, preimage.line_bytes(i), rule);
        ws_fix_copy(&mut b, img.line_bytes(pos + i), rule);
        if a != b {
            return false;
        }
    }
    true
}

fn find_pos(
    img: &LineImage,
    preimage: &LineImage,
    anchor: usize,
    match_beginning: bool,
    match_end: bool,
) -> Option<usize> {
    let max_pos = img.nr().checked_sub(preimage.nr())?;
    for pos in positions_to_try(anchor, max_pos, match_beginning, match_end) {
        if exact_match_at(img, preimage, pos) {
            return Some(pos);
        }
    }
    None
}

fn find_pos_fuzzy(
    img: &LineImage,
    preimage: &LineImage,
    anchor: usize,
    match_beginning: bool,
    match_end: bool,
    rule: &WsRuleSet,
) -> Option<usize> {
    let max_pos = img.nr().checked_sub(preimage.nr())?;
    for pos in positions_to_try(anchor, max_pos, match_beginning, match_end) {
        if fuzzy_match_at(img, preimage, pos, rule) {
            return Some(pos);
        }
    }
    None
}

/// Rewrite the postimage's context lines to match the fixed (whitespace
/// corrected) copy found in the working image, preserving whatever
/// whitespace the target file already had for lines the hunk didn't
/// actually intend to change. Guaranteed length-monotone because
/// `ws_fix_copy` never grows a line.
fn fixup_postimage_common_lines(
    postimage: &mut LineImage,
    preimage: &LineImage,
    img: &LineImage,
    pos: usize,
    context_pairs: &[(usize, usize)],
    rule: &WsRuleSet,
) {
    let mut fixed = Vec::new();
    for &(pi, qi) in context_pairs {
        fixed.clear();
        let before = postimage.lines[qi].len;
        ws_fix_copy(&mut fixed, img.line_bytes(pos + pi), rule);
        debug_assert!(fixed.len() <= before);
        postimage.replace_line(qi, &fixed);
    }
}

/// Outcome of applying one hunk.
pub struct ApplyOutcome {
    pub applied: bool,
    pub leading_reduced: bool,
    pub trailing_reduced: bool,
}

/// Attempt to locate and apply a single text hunk against `img`, mutating it
/// in place on success. Returns whether the hunk applied, trying exact
/// match, then (under `--whitespace=fix`) whitespace-fuzzy match, then
/// context reduction, in that order, matching `apply_one_fragment` in the
/// original implementation.
pub fn apply_hunk(img: &mut LineImage, hunk: &Hunk, session: &ApplySession, rule: &WsRuleSet) -> ApplyOutcome {
    let (mut preimage, mut postimage, mut context_pairs) = build_images(hunk);

    let declared_leading = hunk.leading_context;
    let declared_trailing = hunk.trailing_context;
    let mut leading = declared_leading;
    let mut trailing = declared_trailing;
    let mut removed_leading = 0usize;

    let unidiff_zero = session.options.unidiff_zero;
    let mut match_beginning = hunk.old_pos == 0 || (hunk.old_pos == 1 && !unidiff_zero);
    let mut match_end = !unidiff_zero && trailing == 0;

    loop {
        if preimage.nr() <= img.nr() {
            let anchor = hunk.new_pos.saturating_sub(1) + removed_leading;

            if let Some(pos) = find_pos(img, &preimage, anchor, match_beginning, match_end) {
                img.splice(pos, preimage.nr(), &postimage);
                return ApplyOutcome {
                    applied: true,
                    leading_reduced: leading < declared_leading,
                    trailing_reduced: trailing < declared_trailing,
                };
            }

            if session.options.whitespace == WsMode::Fix {
                if let Some(pos) = find_pos_fuzzy(img, &preimage, anchor, match_beginning, match_end, rule) {
                    fixup_postimage_common_lines(&mut postimage, &preimage, img, pos, &context_pairs, rule);
                    img.splice(pos, preimage.nr(), &postimage);
                    return ApplyOutcome {
                        applied: true,
                        leading_reduced: leading < declared_leading,
                        trailing_reduced: trailing < declared_trailing,
                    };
                }
            }
        }

        if match_beginning && match_end {
            match_beginning = false;
            match_end = false;
            continue;
        }

        let reduced_so_far = (declared_leading - leading) + (declared_trailing - trailing);
        if reduced_so_far >= session.options.p_context {
            return ApplyOutcome {
                applied: false,
                leading_reduced: false,
                trailing_reduced: false,
            };
        }

        if leading == 0 && trailing == 0 {
            return ApplyOutcome {
                applied: false,
                leading_reduced: false,
                trailing_reduced: false,
            };
        }

        // Trailing context is given up before leading: a hunk's anchor is
        // its declared old_pos, so preserving leading context keeps the
        // search anchored near where the hunk claims to start.
        if trailing > 0 {
            preimage.remove_last_line();
            postimage.remove_last_line();
            trailing = trailing.saturating_sub(1);
            match_end = false;
        } else {
            let dropped = context_pairs.first().copied();
            preimage.remove_first_line();
            postimage.remove_first_line();
            if let Some((_, qi)) = dropped {
                context_pairs.retain(|&(_, q)| q != qi);
            }
            context_pairs = context_pairs
                .iter()
                .map(|&(p, q)| (p.saturating_sub(1), q.saturating_sub(1)))
                .collect();
            leading = leading.saturating_sub(1);
            removed_leading += 1;
        }
    }
}
