use std::fs;
use std::io::{self, Read as IoRead, Write};
use std::path::Path;

use anyhow::Result;
use bstr::ByteSlice;
use clap::{Args, ValueEnum};
use git_apply::patch::{HunkKind, HunkLine, Patch, Tri};
use git_apply::session::{ApplyOptions, ApplySession};
use git_apply::whitespace::WsMode;
use git_index::Index;

use super::open_repo;
use crate::Cli;

/// Whitespace error handling action, mapped onto `git_apply::whitespace::WsMode`.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum WhitespaceAction {
    /// Do not warn about whitespace errors
    Nowarn,
    /// Warn about whitespace errors but apply the patch
    Warn,
    /// Fix whitespace errors and apply the patch
    Fix,
    /// Output errors and refuse to apply the patch
    Error,
    /// Like error, but show all errors (not just the first)
    ErrorAll,
}

impl From<WhitespaceAction> for WsMode {
    fn from(a: WhitespaceAction) -> Self {
        match a {
            WhitespaceAction::Nowarn => WsMode::Nowarn,
            WhitespaceAction::Warn => WsMode::Warn,
            WhitespaceAction::Fix => WsMode::Fix,
            WhitespaceAction::Error => WsMode::Error,
            WhitespaceAction::ErrorAll => WsMode::ErrorAll,
        }
    }
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Show diffstat for the input (don't apply)
    #[arg(long)]
    pub stat: bool,

    /// Show number stat for the input (don't apply)
    #[arg(long)]
    pub numstat: bool,

    /// Output a condensed summary of the patch (don't apply)
    #[arg(long)]
    pub summary: bool,

    /// Check if the patch can be applied without actually applying
    #[arg(long)]
    pub check: bool,

    /// Apply even when --stat/--check/--summary was also given
    #[arg(long)]
    pub apply: bool,

    /// Apply the patch to both the index and the working tree
    #[arg(long)]
    pub index: bool,

    /// Apply the patch to the index only (without touching the working tree)
    #[arg(long)]
    pub cached: bool,

    /// Apply the patch in reverse
    #[arg(short = 'R', long)]
    pub reverse: bool,

    /// Leave a `.rej` file for hunks that fail to apply, instead of aborting
    #[arg(long)]
    pub reject: bool,

    /// Remove <n> leading path components (default 1)
    #[arg(short = 'p', default_value = "1")]
    pub strip: usize,

    /// Require at least <n> lines of matching context
    ///
    /// No short form: `-C` is already the binary's global "run as if started
    /// in <path>" flag.
    #[arg(long = "context")]
    pub context: Option<usize>,

    /// Permit hunks with zero lines of context
    #[arg(long)]
    pub unidiff_zero: bool,

    /// Tolerate producers that misreport trailing newlines
    #[arg(long)]
    pub inaccurate_eof: bool,

    /// Ignore the declared hunk line counts and recount from the body
    #[arg(long)]
    pub recount: bool,

    /// Discard added lines (only remove what the patch removes)
    #[arg(long)]
    pub no_add: bool,

    /// Limit which paths are patched (repeatable)
    #[arg(long = "include")]
    pub include: Vec<String>,

    /// Exclude paths from being patched (repeatable)
    #[arg(long = "exclude")]
    pub exclude: Vec<String>,

    /// Prepend <dir> to all filenames
    #[arg(long = "directory")]
    pub directory: Option<String>,

    /// Write preimages of the patched files as a fake ancestor to <file>
    #[arg(long = "build-fake-ancestor")]
    pub build_fake_ancestor: Option<String>,

    /// Be verbose
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Whitespace error handling
    #[arg(long, value_enum)]
    pub whitespace: Option<WhitespaceAction>,

    /// Patch files (read from stdin if empty)
    pub patches: Vec<String>,
}

pub fn run(args: &ApplyArgs, cli: &Cli) -> Result<i32> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let stderr = io::stderr();
    let mut err = stderr.lock();

    let input = read_patch_input(args)?;

    // --stat/--numstat/--summary/--check report on the patch without
    // applying it unless --apply overrides that. --check still runs the
    // full parse-and-locate pass (via `check_only`, below) rather than
    // merely parsing, so a hunk that can't be located is still caught.
    let report_only = (args.stat || args.numstat || args.summary || args.check) && !args.apply;
    let work_tree = std::env::current_dir()?;

    if args.stat || args.numstat || args.summary {
        let mut report_session = ApplySession::new(build_options(args, true));
        let parsed = match git_apply::parse_patches(&input, &mut report_session) {
            Ok(p) => p,
            Err(e) => {
                writeln!(err, "error: {e}")?;
                return Ok(1);
            }
        };
        if args.stat {
            print_stat(&parsed, &mut out)?;
        }
        if args.numstat {
            print_numstat(&parsed, &mut out)?;
        }
        if args.summary {
            print_summary(&parsed, &mut out)?;
        }
        if !args.apply {
            return Ok(0);
        }
    }

    let mut session = ApplySession::new(build_options(args, args.check || report_only));

    if let Some(manifest_path) = &args.build_fake_ancestor {
        write_fake_ancestor(&input, &mut session, &work_tree, manifest_path, cli)?;
    }

    let needs_index = options_need_index(args) && !report_only;
    let repo = if needs_index { Some(open_repo(cli)?) } else { None };
    let mut index = if repo.is_some() { Some(open_index(cli)?) } else { None };
    let odb = repo.as_ref().map(|r| r.odb());

    let apply_result = git_apply::apply_with_index(&input, &mut session, &work_tree, index.as_mut(), odb);

    match apply_result {
        Ok(patches) => {
            if let (Some(idx), Some(repo)) = (index.take(), repo.as_ref()) {
                idx.write_to(&repo.git_dir().join("index"))?;
            }
            if session.any_hunk_failed {
                if args.verbose {
                    for patch in &patches {
                        if let Some(path) = patch.target_path() {
                            writeln!(err, "Applying patch {} with rejects...", path)?;
                        }
                    }
                }
                Ok(1)
            } else {
                Ok(0)
            }
        }
        Err(e) => {
            writeln!(err, "error: {e}")?;
            Ok(1)
        }
    }
}

fn options_need_index(args: &ApplyArgs) -> bool {
    args.index || args.cached
}

fn build_options(args: &ApplyArgs, check_only: bool) -> ApplyOptions {
    ApplyOptions {
        p_value: Some(args.strip),
        p_context: args.context.unwrap_or(usize::MAX),
        unidiff_zero: args.unidiff_zero,
        inaccurate_eof: args.inaccurate_eof,
        recount: args.recount,
        whitespace: args.whitespace.map(WsMode::from).unwrap_or_default(),
        no_add: args.no_add,
        apply_in_reverse: args.reverse,
        apply_with_reject: args.reject,
        cached: args.cached,
        check_only,
        update_index: args.index || args.cached,
        directory: args.directory.clone(),
        include: args.include.clone(),
        exclude: args.exclude.clone(),
        ..ApplyOptions::default()
    }
}

fn open_index(cli: &Cli) -> Result<Index> {
    let repo = open_repo(cli)?;
    let index_path = repo.git_dir().join("index");
    if index_path.exists() {
        Ok(Index::read_from(&index_path)?)
    } else {
        Ok(Index::new())
    }
}

fn read_patch_input(args: &ApplyArgs) -> Result<Vec<u8>> {
    if args.patches.is_empty() {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        let mut buf = Vec::new();
        for path in &args.patches {
            buf.extend_from_slice(&fs::read(path)?);
        }
        Ok(buf)
    }
}

/// `--build-fake-ancestor=<file>`: read each patch's preimage straight off
/// disk (the patches haven't been applied yet at this point in `run`) and
/// hash them into the repository's object database.
fn write_fake_ancestor(
    input: &[u8],
    session: &mut ApplySession,
    work_tree: &Path,
    manifest_path: &str,
    cli: &Cli,
) -> Result<()> {
    let mut scratch = ApplySession::new(session.options.clone());
    let patches = git_apply::parse_patches(input, &mut scratch)?;

    let repo = open_repo(cli)?;
    let odb = repo.odb();

    let mut preimages = Vec::new();
    for patch in &patches {
        if patch.is_binary() {
            continue;
        }
        let Some(path) = patch.old_path.as_ref() else { continue };
        if patch.is_new.is_yes() {
            continue;
        }
        let full = work_tree.join(path.to_path_lossy());
        if let Ok(content) = fs::read(&full) {
            preimages.push((path.to_string(), content));
        }
    }

    let entries = git_apply::fakeancestor::build_fake_ancestor(&patches, &preimages, odb)?;
    git_apply::fakeancestor::write_manifest(&entries, Path::new(manifest_path))?;
    Ok(())
}

// --- Stat / numstat / summary reporting -----------------------------------
//
// `git-apply`'s library surface applies patches; it deliberately doesn't
// format human-readable reports, so the reporting paths here walk the
// parsed `Patch` list directly the way the original CLI's reporting
// functions walked its own hand-rolled `FilePatch` list.

fn display_path(patch: &Patch) -> String {
    match (&patch.old_path, &patch.new_path) {
        (Some(old), Some(new)) if old != new => format!("{} => {}", old, new),
        (_, Some(new)) => new.to_string(),
        (Some(old), _) => old.to_string(),
        _ => patch.def_path.as_ref().map(|p| p.to_string()).unwrap_or_default(),
    }
}

fn line_counts(patch: &Patch) -> (usize, usize) {
    let mut added = 0usize;
    let mut removed = 0usize;
    if let HunkKind::Text(hunks) = &patch.hunks {
        for hunk in hunks {
            for line in &hunk.body {
                match line {
                    HunkLine::Add(_) => added += 1,
                    HunkLine::Remove(_) => removed += 1,
                    HunkLine::Context(_) | HunkLine::NoNewlineMarker => {}
                }
            }
        }
    }
    (added, removed)
}

fn print_stat(patches: &[Patch], out: &mut impl Write) -> Result<()> {
    let mut total_add = 0usize;
    let mut total_del = 0usize;
    let mut max_name_len = 0usize;

    let mut stats: Vec<(String, usize, usize)> = Vec::new();
    for patch in patches {
        let name = display_path(patch);
        let (added, removed) = line_counts(patch);
        max_name_len = max_name_len.max(name.len());
        total_add += added;
        total_del += removed;
        stats.push((name, added, removed));
    }

    let max_change = stats.iter().map(|(_, a, d)| a + d).max().unwrap_or(0);
    let bar_width = 50usize;

    for (name, added, removed) in &stats {
        let total = added + removed;
        let bar_len = if max_change > 0 {
            (total * bar_width) / max_change.max(1)
        } else {
            0
        }
        .min(bar_width);

        let plus_len = if total > 0 { (added * bar_len) / total.max(1) } else { 0 };
        let minus_len = bar_len.saturating_sub(plus_len);

        writeln!(
            out,
            " {:<width$} | {:>5} {}{}",
            name,
            total,
            "+".repeat(plus_len),
            "-".repeat(minus_len),
            width = max_name_len
        )?;
    }

    writeln!(
        out,
        " {} file{} changed, {} insertion{}(+), {} deletion{}(-)",
        stats.len(),
        if stats.len() != 1 { "s" } else { "" },
        total_add,
        if total_add != 1 { "s" } else { "" },
        total_del,
        if total_del != 1 { "s" } else { "" },
    )?;

    Ok(())
}

fn print_numstat(patches: &[Patch], out: &mut impl Write) -> Result<()> {
    for patch in patches {
        let (added, removed) = line_counts(patch);
        writeln!(out, "{}\t{}\t{}", added, removed, display_path(patch))?;
    }
    Ok(())
}

fn print_summary(patches: &[Patch], out: &mut impl Write) -> Result<()> {
    for patch in patches {
        if patch.is_rename {
            if let (Some(old), Some(new)) = (&patch.old_path, &patch.new_path) {
                writeln!(out, " rename {} => {} (100%)", old, new)?;
            }
        } else if patch.is_copy {
            if let (Some(old), Some(new)) = (&patch.old_path, &patch.new_path) {
                writeln!(out, " copy {} => {} (100%)", old, new)?;
            }
        } else if patch.is_new.is_yes() {
            if let Some(new) = &patch.new_path {
                writeln!(out, " create mode {:06o} {}", patch.new_mode, new)?;
            }
        } else if matches!(patch.is_delete, Tri::Yes) {
            if let Some(old) = &patch.old_path {
                writeln!(out, " delete mode {:06o} {}", patch.old_mode, old)?;
            }
        } else if patch.old_mode != 0 && patch.new_mode != 0 && patch.old_mode != patch.new_mode {
            if let Some(new) = &patch.new_path {
                writeln!(out, " mode change {:06o} => {:06o} {}", patch.old_mode, patch.new_mode, new)?;
            }
        }
    }
    Ok(())
}
