//! Stack frame capture for error notices.
//!
//! Captures the current stack with the `backtrace` crate and trims it down to
//! the frames a reader cares about: frames from this crate and the standard
//! library at the top of the stack are dropped, runs of `std`/`tokio` frames
//! in the middle are collapsed, and runtime start-up frames at the bottom are
//! removed.
//!
//! # Environment Variables
//!
//! - `RUST_BACKTRACE=full` or `HONEYBADGER_BACKTRACE=full` disables all
//!   filtering.

use std::{borrow::Cow, sync::OnceLock};

use backtrace::BytesOrWideString;

use crate::notice::Frame;

/// Which frames to drop from a captured stack.
#[derive(Copy, Clone, Debug)]
pub struct BacktraceFilter {
    /// Crates whose frames are dropped while they are at the top of the stack.
    pub skipped_initial_crates: &'static [&'static str],
    /// Crates whose consecutive frames are collapsed anywhere in the stack.
    /// A run of exactly one frame is kept.
    pub skipped_middle_crates: &'static [&'static str],
    /// Crates whose frames are dropped from the bottom of the stack.
    pub skipped_final_crates: &'static [&'static str],
    /// Maximum number of frames to keep.
    pub max_frames: usize,
}

impl BacktraceFilter {
    /// Default filter settings.
    pub const DEFAULT: Self = Self {
        skipped_initial_crates: &["backtrace", "honeybadger", "core", "std", "alloc"],
        skipped_middle_crates: &["std", "core", "alloc", "tokio", "futures-util"],
        skipped_final_crates: &["std", "core", "alloc", "tokio"],
        max_frames: 50,
    };

    /// Keeps every frame.
    pub const FULL: Self = Self {
        skipped_initial_crates: &[],
        skipped_middle_crates: &[],
        skipped_final_crates: &[],
        max_frames: usize::MAX,
    };

    /// [`DEFAULT`](Self::DEFAULT), or [`FULL`](Self::FULL) when the
    /// environment asks for full backtraces.
    pub fn from_env() -> Self {
        static FULL_BACKTRACE: OnceLock<bool> = OnceLock::new();

        let full = *FULL_BACKTRACE.get_or_init(|| {
            ["RUST_BACKTRACE", "HONEYBADGER_BACKTRACE"]
                .iter()
                .any(|key| std::env::var_os(key).is_some_and(|var| var == "full"))
        });

        if full { Self::FULL } else { Self::DEFAULT }
    }
}

impl Default for BacktraceFilter {
    fn default() -> Self {
        Self::DEFAULT
    }
}

struct CapturedFrame {
    symbol: String,
    path: FramePath,
    line: Option<u32>,
}

impl CapturedFrame {
    fn crate_name(&self) -> Option<&str> {
        self.path.crate_name.as_deref()
    }

    fn is_trailing_noise(&self, filter: &BacktraceFilter) -> bool {
        self.crate_name()
            .is_some_and(|name| filter.skipped_final_crates.contains(&name))
            || self.symbol == "__libc_start_call_main"
            || self.symbol == "__libc_start_main_impl"
            || self.symbol == "_start"
    }

    fn into_frame(self) -> Frame {
        Frame {
            number: self.line,
            file: Some(self.path.raw_path),
            method: method_name(&self.symbol),
        }
    }
}

/// Captures the calling stack, most recent frame first.
///
/// Returns `None` when no frame carried symbol and file information, which is
/// the case for release builds without debug info.
pub fn capture(filter: &BacktraceFilter) -> Option<Vec<Frame>> {
    let mut initial_filtering = !filter.skipped_initial_crates.is_empty();
    let mut frames: Vec<CapturedFrame> = Vec::new();
    // Crate of the run being collapsed, plus its first frame while the run
    // is only one frame long.
    let mut collapsing: Option<(String, Option<CapturedFrame>)> = None;

    backtrace::trace(|frame| {
        backtrace::resolve_frame(frame, |symbol| {
            let (Some(sym), Some(filename_raw)) = (symbol.name(), symbol.filename_raw()) else {
                return;
            };

            if frames.len() >= filter.max_frames {
                return;
            }

            let captured = CapturedFrame {
                symbol: format!("{sym:#}"),
                path: FramePath::new(filename_raw),
                line: symbol.lineno(),
            };

            if initial_filtering {
                if captured
                    .crate_name()
                    .is_some_and(|name| filter.skipped_initial_crates.contains(&name))
                {
                    return;
                }
                initial_filtering = false;
            }

            if let Some((run_crate, first)) = &mut collapsing
                && captured.crate_name() == Some(run_crate.as_str())
            {
                *first = None;
                return;
            }

            if let Some((_, first)) = collapsing.take() {
                frames.extend(first);
            }

            if let Some(name) = captured
                .crate_name()
                .filter(|name| filter.skipped_middle_crates.contains(name))
            {
                collapsing = Some((name.to_owned(), Some(captured)));
                return;
            }

            frames.push(captured);
        });

        true
    });

    if let Some((_, first)) = collapsing.take() {
        frames.extend(first);
    }

    while frames
        .last()
        .is_some_and(|frame| frame.is_trailing_noise(filter))
    {
        frames.pop();
    }

    if frames.is_empty() {
        None
    } else {
        Some(frames.into_iter().map(CapturedFrame::into_frame).collect())
    }
}

struct FramePath {
    raw_path: String,
    crate_name: Option<Cow<'static, str>>,
}

impl FramePath {
    fn new(path: BytesOrWideString<'_>) -> Self {
        static REGEXES: OnceLock<Option<[regex::Regex; 2]>> = OnceLock::new();
        let regexes = REGEXES.get_or_init(|| {
            Some([
                // /lib/rustlib/src/rust/library/{std|core|alloc}/src/...
                // /rustc/{40-char-hash}/library/{std|core|alloc}/src/...
                regex::Regex::new(
                    r"(?:/lib/rustlib/src/rust|^/rustc/[0-9a-f]{40})/library/(std|core|alloc)/src/.*$",
                )
                .ok()?,
                // /.cargo/registry/src/{index}-{16-char-hash}/{crate}-{version}/src/...
                regex::Regex::new(
                    r"/\.cargo/registry/src/[^/]+-[0-9a-f]{16}/([^./]+)-[0-9]+\.[^/]*/src/.*$",
                )
                .ok()?,
            ])
        });

        let raw_path = path.to_str_lossy().into_owned();

        let crate_name = regexes
            .iter()
            .flatten()
            .find_map(|regex| regex.captures(&raw_path))
            .and_then(|captures| captures.get(1))
            .map(|name| Cow::Owned(name.as_str().to_owned()))
            .or_else(|| {
                raw_path
                    .starts_with(concat!(env!("CARGO_MANIFEST_DIR"), "/src"))
                    .then_some(Cow::Borrowed("honeybadger"))
            });

        Self {
            raw_path,
            crate_name,
        }
    }
}

/// Name reported for a demangled symbol: the function's own name, prefixed
/// with its type for methods. Closures and async blocks are named after the
/// function they are defined in.
fn method_name(symbol: &str) -> String {
    let segments = split_path(symbol);
    let Some(function) = segments
        .iter()
        .rposition(|segment| is_ident(strip_generics(segment)))
    else {
        return symbol.to_owned();
    };

    let name = strip_generics(segments[function]);
    match function.checked_sub(1).and_then(|owner| owner_type(segments[owner])) {
        Some(owner) => format!("{owner}::{name}"),
        None => name.to_owned(),
    }
}

/// Splits a path on the `::` separators that are not nested in brackets.
fn split_path(path: &str) -> Vec<&str> {
    let bytes = path.as_bytes();
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'<' | b'{' | b'(' | b'[' => depth += 1,
            // `->` in a fn pointer type
            b'>' if i > 0 && bytes[i - 1] == b'-' => {}
            b'>' | b'}' | b')' | b']' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                segments.push(&path[start..i]);
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    segments.push(&path[start..]);
    segments
}

fn strip_generics(segment: &str) -> &str {
    segment.split_once('<').map_or(segment, |(head, _)| head)
}

fn is_ident(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || unicode_ident::is_xid_start(c))
        && chars.all(unicode_ident::is_xid_continue)
}

/// The short type name of a path segment that names a type: `Db` for
/// `Db<T>`, `<app::Db as app::Store>` and `<app::Db<T>>`.
fn owner_type(segment: &str) -> Option<&str> {
    let self_type = match segment.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        Some(qualified) => qualified.split_once(" as ").map_or(qualified, |(ty, _)| ty),
        None => segment,
    };
    let name = strip_generics(split_path(self_type).last().copied()?);
    (is_ident(name) && name.starts_with(char::is_uppercase)).then_some(name)
}
