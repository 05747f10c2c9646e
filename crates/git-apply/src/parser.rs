//! Patch Parser: turns a raw patch stream into a list of [`Patch`] records.

use bstr::{BString, ByteSlice};

use crate::base85;
use crate::error::{ApplyError, Result};
use crate::patch::{BinaryHunk, BinaryMethod, Hunk, HunkKind, HunkLine, Patch, Tri};
use crate::session::ApplySession;

/// Parse an entire patch stream (possibly containing preamble garbage and
/// multiple `diff --git` / traditional-unified-diff patches) into a list of
/// [`Patch`] records in input order.
pub fn parse_patches(input: &[u8], session: &mut ApplySession) -> Result<Vec<Patch>> {
    let mut cursor = Cursor::new(input);
    let mut patches = Vec::new();

    while let Some(line) = cursor.peek() {
        session.linenr = cursor.linenr + 1;
        if line.starts_with(b"diff --git ") {
            let patch = parse_git_patch(&mut cursor, session)?;
            patches.push(patch);
        } else if line.starts_with(b"--- ") && looks_like_traditional_header(&cursor) {
            let patch = parse_traditional_patch(&mut cursor, session)?;
            patches.push(patch);
        } else if line.starts_with(b"@@ -") {
            return Err(ApplyError::FragmentWithoutHeader { line: cursor.linenr + 1 });
        } else {
            cursor.advance();
        }
    }

    Ok(patches)
}

struct Cursor<'a> {
    lines: Vec<&'a [u8]>,
    pos: usize,
    linenr: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a [u8]) -> Self {
        let mut lines = Vec::new();
        let mut start = 0;
        while start < input.len() {
            let end = match input[start..].iter().position(|&b| b == b'\n') {
                Some(off) => start + off,
                None => input.len(),
            };
            lines.push(&input[start..end]);
            start = end + 1;
        }
        Self { lines, pos: 0, linenr: 0 }
    }

    fn peek(&self) -> Option<&'a [u8]> {
        self.lines.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<&'a [u8]> {
        self.lines.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<&'a [u8]> {
        let line = self.peek();
        if line.is_some() {
            self.pos += 1;
            self.linenr += 1;
        }
        line
    }

    fn eof(&self) -> bool {
        self.pos >= self.lines.len()
    }
}

fn looks_like_traditional_header(cursor: &Cursor) -> bool {
    cursor
        .peek_at(1)
        .is_some_and(|l| l.starts_with(b"+++ "))
}

/// Unquote a C-style quoted path (`"a\tb"`), octal-escaping non-printable
/// bytes the way `core.quotePath` does on output. Input without a leading
/// `"` is returned unchanged.
fn unquote_path(raw: &[u8]) -> BString {
    if raw.first() != Some(&b'"') || raw.last() != Some(&b'"') || raw.len() < 2 {
        return BString::from(raw);
    }
    let inner = &raw[1..raw.len() - 1];
    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        if inner[i] == b'\\' && i + 1 < inner.len() {
            match inner[i + 1] {
                b'n' => {
                    out.push(b'\n');
                    i += 2;
                }
                b't' => {
                    out.push(b'\t');
                    i += 2;
                }
                b'\\' => {
                    out.push(b'\\');
                    i += 2;
                }
                b'"' => {
                    out.push(b'"');
                    i += 2;
                }
                b'0'..=b'7' => {
                    let mut val = 0u32;
                    let mut n = 0;
                    let mut j = i + 1;
                    while n < 3 && j < inner.len() && (b'0'..=b'7').contains(&inner[j]) {
                        val = val * 8 + (inner[j] - b'0') as u32;
                        j += 1;
                        n += 1;
                    }
                    out.push(val as u8);
                    i = j;
                }
                other => {
                    out.push(other);
                    i += 2;
                }
            }
        } else {
            out.push(inner[i]);
            i += 1;
        }
    }
    BString::from(out)
}

/// Strip `p_value` leading `/`-separated path components, collapsing
/// doubled slashes, and prepend `directory` if given.
fn strip_path(raw: &[u8], p_value: usize, directory: Option<&str>) -> BString {
    let path = unquote_path(raw);
    let path = path.replace("//", "/");
    let mut components: Vec<&[u8]> = path.split(|&b| b == b'/').collect();
    for _ in 0..p_value {
        if components.len() > 1 {
            components.remove(0);
        }
    }
    let stripped = components.join(&b'/');
    match directory {
        Some(dir) => {
            let mut out = Vec::new();
            out.extend_from_slice(dir.trim_end_matches('/').as_bytes());
            out.push(b'/');
            out.extend_from_slice(&stripped);
            BString::from(out)
        }
        None => BString::from(stripped),
    }
}

/// Parse the `a/X b/Y` remainder of a `diff --git ` line into the two raw
/// (unstripped) paths. Quoted components and embedded spaces are handled by
/// scanning for the first ` b/` boundary, falling back to a half-split.
fn split_diff_git_paths(rest: &[u8]) -> (Vec<u8>, Vec<u8>) {
    if let Some(idx) = find_subslice(rest, b" b/") {
        let old = &rest[..idx];
        let new = &rest[idx + 1..];
        return (old.to_vec(), new.to_vec());
    }
    let mid = rest.len() / 2;
    (rest[..mid].to_vec(), rest[mid..].to_vec())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_git_patch(cursor: &mut Cursor, session: &mut ApplySession) -> Result<Patch> {
    let header_line = cursor.advance().unwrap();
    let rest = &header_line[b"diff --git ".len()..];
    let (old_raw, new_raw) = split_diff_git_paths(rest);
    let old_raw = old_raw.strip_prefix(b"a/").unwrap_or(&old_raw).to_vec();
    let new_raw = new_raw.strip_prefix(b"b/").unwrap_or(&new_raw).to_vec();

    let mut patch = Patch::new();
    let p_value = session.options.p_value.unwrap_or(1);
    let directory = session.options.directory.as_deref();
    patch.def_path = Some(strip_path(&old_raw, p_value, directory));

    loop {
        let Some(line) = cursor.peek() else { break };
        if let Some(rest) = line.strip_prefix(b"old mode ") {
            patch.old_mode = parse_octal(rest);
        } else if let Some(rest) = line.strip_prefix(b"new mode ") {
            patch.new_mode = parse_octal(rest);
        } else if let Some(rest) = line.strip_prefix(b"deleted file mode ") {
            patch.is_delete = Tri::Yes;
            patch.old_mode = parse_octal(rest);
        } else if let Some(rest) = line.strip_prefix(b"new file mode ") {
            patch.is_new = Tri::Yes;
            patch.new_mode = parse_octal(rest);
        } else if let Some(rest) = line.strip_prefix(b"copy from ") {
            patch.is_copy = true;
            patch.old_path = Some(strip_path(rest, 0, None));
        } else if let Some(rest) = line.strip_prefix(b"copy to ") {
            patch.is_copy = true;
            patch.new_path = Some(strip_path(rest, 0, None));
        } else if let Some(rest) = line.strip_prefix(b"rename from ") {
            patch.is_rename = true;
            patch.old_path = Some(strip_path(rest, 0, None));
        } else if let Some(rest) = line.strip_prefix(b"rename to ") {
            patch.is_rename = true;
            patch.new_path = Some(strip_path(rest, 0, None));
        } else if line.starts_with(b"similarity index ") || line.starts_with(b"dissimilarity index ") {
            // recorded but not used: content-level rename/copy detection is a Non-goal.
        } else if let Some(rest) = line.strip_prefix(b"index ") {
            parse_index_line(rest, &mut patch);
        } else if line.starts_with(b"--- ") {
            let path_part = &line[4..];
            if path_part != b"/dev/null" {
                let p = path_part.strip_prefix(b"a/").unwrap_or(path_part);
                patch.old_path = Some(strip_path(p, p_value.saturating_sub(1), directory));
            } else {
                patch.is_new = Tri::Yes;
            }
        } else if line.starts_with(b"+++ ") {
            let path_part = &line[4..];
            if path_part != b"/dev/null" {
                let p = path_part.strip_prefix(b"b/").unwrap_or(path_part);
                patch.new_path = Some(strip_path(p, p_value.saturating_sub(1), directory));
            } else {
                patch.is_delete = Tri::Yes;
            }
            cursor.advance();
            break;
        } else if line.starts_with(b"@@ -") || line.starts_with(b"GIT binary patch") || line.starts_with(b"Binary files ") {
            break;
        } else {
            break;
        }
        cursor.advance();
    }

    if patch.old_path.is_none() {
        patch.old_path = patch.def_path.clone();
    }
    if patch.new_path.is_none() {
        patch.new_path = patch.def_path.clone();
    }

    patch.hunks = parse_hunks_or_binary(cursor, session, &mut patch)?;
    finalize_new_delete_state(&mut patch)?;
    Ok(patch)
}

fn parse_octal(s: &[u8]) -> u32 {
    let s = s.trim_end();
    let mut v = 0u32;
    for &b in s {
        if !(b'0'..=b'7').contains(&b) {
            break;
        }
        v = v * 8 + (b - b'0') as u32;
    }
    v
}

fn parse_index_line(rest: &[u8], patch: &mut Patch) {
    let rest = rest.trim_end();
    let text = String::from_utf8_lossy(rest);
    let hashes = text.split(' ').next().unwrap_or("");
    if let Some((old, new)) = hashes.split_once("..") {
        patch.old_hash_prefix = Some(old.to_string());
        patch.new_hash_prefix = Some(new.to_string());
    }
}

fn parse_traditional_patch(cursor: &mut Cursor, session: &mut ApplySession) -> Result<Patch> {
    let mut patch = Patch::new();
    let p_value = session.options.p_value.unwrap_or(1);
    let directory = session.options.directory.as_deref();

    let old_line = cursor.advance().unwrap();
    let old_part = &old_line[4..];
    let old_field = old_part.split(|&b| b == b'\t').next().unwrap_or(old_part);
    if old_field.trim() != b"/dev/null" {
        patch.old_path = Some(strip_path(old_field.trim(), p_value, directory));
    } else {
        patch.is_new = Tri::Yes;
    }

    let new_line = cursor.advance().unwrap();
    let new_part = &new_line[4..];
    let new_field = new_part.split(|&b| b == b'\t').next().unwrap_or(new_part);
    if new_field.trim() != b"/dev/null" {
        patch.new_path = Some(strip_path(new_field.trim(), p_value, directory));
    } else {
        patch.is_delete = Tri::Yes;
    }

    patch.hunks = parse_hunks_or_binary(cursor, session, &mut patch)?;
    finalize_new_delete_state(&mut patch)?;
    Ok(patch)
}

fn finalize_new_delete_state(patch: &mut Patch) -> Result<()> {
    if let HunkKind::Text(hunks) = &patch.hunks {
        let has_old_content = hunks.iter().any(|h| h.old_lines > 0);
        let has_new_content = hunks.iter().any(|h| h.new_lines > 0);
        if matches!(patch.is_new, Tri::Yes) && has_old_content {
            return Err(ApplyError::Semantic("new file depends on old contents".into()));
        }
        if matches!(patch.is_delete, Tri::Yes) && has_new_content {
            return Err(ApplyError::Semantic("deleted file still has contents".into()));
        }
        if matches!(patch.is_new, Tri::Unknown) && !has_old_content && hunks.len() <= 1 {
            // leave Unknown; a single all-additions hunk is ambiguous without
            // an explicit "new file mode" header.
        } else if matches!(patch.is_new, Tri::Unknown) {
            patch.is_new = Tri::No;
        }
        if matches!(patch.is_delete, Tri::Unknown) {
            patch.is_delete = Tri::No;
        }
    }
    Ok(())
}

fn parse_hunks_or_binary(cursor: &mut Cursor, session: &mut ApplySession, patch: &mut Patch) -> Result<HunkKind> {
    let mut hunks = Vec::new();
    loop {
        match cursor.peek() {
            Some(line) if line.starts_with(b"@@ -") => {
                hunks.push(parse_one_hunk(cursor, session, patch.recount)?);
            }
            Some(line) if line.starts_with(b"GIT binary patch") => {
                cursor.advance();
                return Ok(parse_binary_block(cursor)?);
            }
            Some(line) if line.starts_with(b"Binary files ") || line.starts_with(b"Files ") => {
                cursor.advance();
                // No inline payload available for this form: record an
                // empty literal hunk so callers see "binary, no patch data".
                return Ok(HunkKind::Binary {
                    forward: BinaryHunk {
                        method: BinaryMethod::LiteralDeflated,
                        deflated_payload: Vec::new(),
                        original_length: 0,
                    },
                    reverse: None,
                });
            }
            _ => break,
        }
    }
    Ok(HunkKind::Text(hunks))
}

fn parse_one_hunk(cursor: &mut Cursor, session: &mut ApplySession, recount: bool) -> Result<Hunk> {
    let header = cursor.advance().unwrap();
    let (old_pos, old_lines, new_pos, new_lines) = parse_hunk_header(header, session.linenr)?;

    let mut body = Vec::new();
    let mut old_seen = 0usize;
    let mut new_seen = 0usize;
    let mut leading_context = 0usize;
    let mut trailing_context = 0usize;
    let mut seen_change = false;

    loop {
        let Some(line) = cursor.peek() else { break };
        if line.starts_with(b"@@ -") || line.starts_with(b"diff --git ") {
            break;
        }
        if !recount && old_seen >= old_lines && new_seen >= new_lines {
            break;
        }
        cursor.advance();

        if line.starts_with(b"\\") {
            body.push(HunkLine::NoNewlineMarker);
            continue;
        }
        if line.is_empty() {
            body.push(HunkLine::Context(BString::from("")));
            old_seen += 1;
            new_seen += 1;
            if seen_change {
                trailing_context += 1;
            } else {
                leading_context += 1;
            }
            continue;
        }
        match line[0] {
            b' ' => {
                body.push(HunkLine::Context(BString::from(&line[1..])));
                old_seen += 1;
                new_seen += 1;
                if seen_change {
                    trailing_context += 1;
                } else {
                    leading_context += 1;
                }
            }
            b'-' => {
                body.push(HunkLine::Remove(BString::from(&line[1..])));
                old_seen += 1;
                seen_change = true;
                trailing_context = 0;
            }
            b'+' => {
                body.push(HunkLine::Add(BString::from(&line[1..])));
                new_seen += 1;
                seen_change = true;
                trailing_context = 0;
            }
            _ => {
                return Err(ApplyError::Parse {
                    line: session.linenr,
                    reason: format!("unrecognized hunk body line: {:?}", BString::from(line)),
                })
            }
        }
    }

    let (old_lines, new_lines) = if recount { (old_seen, new_seen) } else { (old_lines, new_lines) };

    Ok(Hunk {
        old_pos,
        old_lines,
        new_pos,
        new_lines,
        leading_context,
        trailing_context,
        body,
        rejected: false,
    })
}

/// Parse a `@@ -a,b +c,d @@` header line.
fn parse_hunk_header(line: &[u8], linenr: usize) -> Result<(usize, usize, usize, usize)> {
    let text = line.to_str().map_err(|_| ApplyError::Parse {
        line: linenr,
        reason: "non-UTF8 hunk header".into(),
    })?;
    let body = text
        .strip_prefix("@@ -")
        .ok_or_else(|| ApplyError::Parse { line: linenr, reason: "malformed hunk header".into() })?;
    let end = body.find(" @@").ok_or_else(|| ApplyError::Parse {
        line: linenr,
        reason: "malformed hunk header".into(),
    })?;
    let ranges = &body[..end];
    let mut parts = ranges.splitn(2, " +");
    let old_range = parts.next().unwrap_or("");
    let new_range = parts.next().unwrap_or("");
    let (old_pos, old_lines) = parse_range(old_range);
    let (new_pos, new_lines) = parse_range(new_range);
    Ok((old_pos, old_lines, new_pos, new_lines))
}

fn parse_range(s: &str) -> (usize, usize) {
    let mut it = s.splitn(2, ',');
    let pos: usize = it.next().and_then(|v| v.parse().ok()).unwrap_or(0);
    let count: usize = it.next().and_then(|v| v.parse().ok()).unwrap_or(1);
    (pos, count)
}

/// Parse one or two base85 binary blocks following `GIT binary patch`.
fn parse_binary_block(cursor: &mut Cursor) -> Result<HunkKind> {
    let forward = parse_one_binary_hunk(cursor)?
        .ok_or_else(|| ApplyError::Parse { line: cursor.linenr, reason: "missing binary hunk payload".into() })?;
    let reverse = parse_one_binary_hunk(cursor)?;
    Ok(HunkKind::Binary { forward, reverse })
}

fn parse_one_binary_hunk(cursor: &mut Cursor) -> Result<Option<BinaryHunk>> {
    while cursor.peek().is_some_and(|l| l.is_empty()) {
        cursor.advance();
    }
    let Some(line) = cursor.peek() else { return Ok(None) };

    let (method, declared_len) = if let Some(rest) = line.strip_prefix(b"literal ") {
        (BinaryMethod::LiteralDeflated, parse_decimal(rest))
    } else if let Some(rest) = line.strip_prefix(b"delta ") {
        (BinaryMethod::DeltaDeflated, parse_decimal(rest))
    } else {
        return Ok(None);
    };
    cursor.advance();

    let mut payload = Vec::new();
    let mut remaining = declared_len;
    while let Some(line) = cursor.peek() {
        if line.is_empty() {
            cursor.advance();
            break;
        }
        let chunk = base85::decode_line(line, remaining)?;
        remaining = remaining.saturating_sub(chunk.len());
        payload.extend_from_slice(&chunk);
        cursor.advance();
    }

    Ok(Some(BinaryHunk {
        method,
        deflated_payload: payload,
        original_length: declared_len,
    }))
}

fn parse_decimal(s: &[u8]) -> usize {
    let s = s.trim_end();
    std::str::from_utf8(s).ok().and_then(|v| v.parse().ok()).unwrap_or(0)
}
