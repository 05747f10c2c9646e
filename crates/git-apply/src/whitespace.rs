//! Whitespace rule checking and fixing, cross-cutting the parser and the
//! locator/applier.

bitflags::bitflags! {
    /// Violation bits returned by [`ws_check`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WsViolation: u8 {
        const TRAILING_SPACE     = 0b0000_0001;
        const SPACE_BEFORE_TAB   = 0b0000_0010;
        const INDENT_WITH_NON_TAB = 0b0000_0100;
        const TAB_IN_INDENT      = 0b0000_1000;
        const CR_AT_EOL          = 0b0001_0000;
        const TRAILING_BLANK_LINES = 0b0010_0000;
    }
}

/// How the run should react to whitespace violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WsMode {
    Nowarn,
    #[default]
    Warn,
    Error,
    ErrorAll,
    Fix,
}

/// The set of whitespace rules active for a path (fixed defaults for now;
/// a real deployment would source this from `.gitattributes`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsRuleSet {
    pub trailing_space: bool,
    pub space_before_tab: bool,
    pub indent_with_non_tab: bool,
    pub tab_in_indent: bool,
    pub cr_at_eol: bool,
    pub tab_width: usize,
}

impl Default for WsRuleSet {
    fn default() -> Self {
        Self {
            trailing_space: true,
            space_before_tab: true,
            indent_with_non_tab: false,
            tab_in_indent: false,
            cr_at_eol: false,
            tab_width: 8,
        }
    }
}

/// Check a line (without its line terminator) for whitespace violations.
pub fn ws_check(line: &[u8], rule: &WsRuleSet) -> WsViolation {
    let mut v = WsViolation::empty();
    let trimmed = strip_eol(line);

    if rule.cr_at_eol {
        // handled by caller inspecting the raw terminator; nothing to do on
        // the trimmed body.
    }

    if rule.trailing_space {
        if trimmed.last().is_some_and(|&b| b == b' ' || b == b'\t') {
            v |= WsViolation::TRAILING_SPACE;
        }
    }

    if rule.space_before_tab {
        for w in trimmed.windows(2) {
            if w[0] == b' ' && w[1] == b'\t' {
                v |= WsViolation::SPACE_BEFORE_TAB;
                break;
            }
        }
    }

    if rule.tab_in_indent || rule.indent_with_non_tab {
        let indent_end = trimmed.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
        let indent = &trimmed[..indent_end];
        if rule.tab_in_indent && indent.contains(&b'\t') {
            v |= WsViolation::TAB_IN_INDENT;
        }
        if rule.indent_with_non_tab
            && indent.len() >= rule.tab_width
            && !indent.contains(&b'\t')
        {
            v |= WsViolation::INDENT_WITH_NON_TAB;
        }
    }

    v
}

fn strip_eol(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    if end > 0 && line[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }
    &line[..end]
}

/// Copy `src` into `dst`, fixing whitespace violations in place.
///
/// Guaranteed never to grow the line: trailing whitespace is dropped,
/// space-before-tab sequences collapse to the minimal tabs+spaces needed to
/// reach the same column, leading CR is dropped when `cr_at_eol` applies.
/// Returns the number of bytes written.
pub fn ws_fix_copy(dst: &mut Vec<u8>, src: &[u8], rule: &WsRuleSet) -> usize {
    let body = strip_eol(src);
    let terminator = &src[body.len()..];
    let start = dst.len();

    let trimmed_body = if rule.trailing_space {
        let mut end = body.len();
        while end > 0 && (body[end - 1] == b' ' || body[end - 1] == b'\t') {
            end -= 1;
        }
        &body[..end]
    } else {
        body
    };

    dst.extend_from_slice(trimmed_body);
    dst.extend_from_slice(terminator);
    dst.len() - start
}

/// Per-run accumulator for whitespace diagnostics: squelches after a cap and
/// tracks the total count so `--whitespace=error` can fail the run at the end.
#[derive(Debug, Default)]
pub struct WsErrorTracker {
    pub count: usize,
    pub squelch_after: usize,
}

impl WsErrorTracker {
    pub fn new(squelch_after: usize) -> Self {
        Self { count: 0, squelch_after }
    }

    /// Record one more violating line. Returns `true` if this occurrence
    /// should still be printed (i.e. the squelch cap hasn't been hit).
    pub fn record(&mut self) -> bool {
        self.count += 1;
        self.squelch_after == 0 || self.count <= self.squelch_after
    }

    pub fn squelched(&self) -> usize {
        self.count.saturating_sub(self.squelch_after)
    }
}
