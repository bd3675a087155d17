//! Turns raw generator text into a runnable code fragment.
//!
//! The pipeline trims generator commentary, unwraps a fenced python block,
//! un-escapes literal `\n` sequences, and rewrites the last line so the
//! fragment's final expression yields the answer.
//!
//! The last-line repair is pattern based, not a parser. It recovers the common
//! case of assignments collapsed onto one line and otherwise leaves the text
//! alone; execution failure is the safety net for whatever it gets wrong.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```python[ \n](.*?)[ \n]```?").expect("fence regex"));
static ASSIGNMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_]\w*)\s*=").expect("assignment regex"));
static ASSIGNMENT_CANDIDATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z_]\w*\s*=").expect("candidate regex"));
static TRAILING_IDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<body>.*\S)\s+(?P<tail>[A-Za-z_]\w*)$").expect("trailing ident regex")
});

const KEYWORDS: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda",
    "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

/// Why a fragment could not be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("Empty code after parsing")]
    Empty,
    #[error("Code format is not correct")]
    Format,
}

/// Extractor output: the fragment to execute and an optional non-fatal error.
///
/// A `Format` error still carries code; only `Empty` carries an empty fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub code: String,
    pub error: Option<ExtractionError>,
}

/// Extract a normalized fragment from raw generator text.
pub fn extract(raw: &str) -> Extraction {
    let text = strip_commentary(raw);
    let block = FENCE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |body| body.as_str())
        .replace("\\n", "\n");
    let block = block
        .trim_end()
        .trim_start_matches(['\n', '\r'])
        .to_string();

    if block.trim().is_empty() {
        return Extraction {
            code: String::new(),
            error: Some(ExtractionError::Empty),
        };
    }
    if !block.contains('\n') && block.matches('=').count() > 1 {
        debug!(raw_len = raw.len(), "single line with several assignments");
        return Extraction {
            code: text.to_string(),
            error: Some(ExtractionError::Format),
        };
    }

    let code = normalize_last_line(&block);
    debug!(lines = code.lines().count(), "extracted code fragment");
    Extraction { code, error: None }
}

/// Drop everything after the first `---` or triple line break.
fn strip_commentary(raw: &str) -> &str {
    let text = raw.split("---").next().unwrap_or_default();
    text.split("\n\n\n").next().unwrap_or_default()
}

fn normalize_last_line(block: &str) -> String {
    let (head, last) = match block.rsplit_once('\n') {
        Some((head, last)) => (Some(head), last),
        None => (None, block),
    };

    let mut lines = split_concatenated_assignments(last);
    if let Some(segment) = lines.pop() {
        lines.extend(finish_with_expression(&segment));
    }

    let tail = lines.join("\n");
    match head {
        Some(head) => format!("{head}\n{tail}"),
        None => tail,
    }
}

/// Name bound by a bare `name = ...` line (augmented and comparison forms excluded).
pub(crate) fn assigned_name(line: &str) -> Option<&str> {
    let caps = ASSIGNMENT_RE.captures(line)?;
    let whole = caps.get(0)?;
    if line[whole.end()..].starts_with('=') {
        return None;
    }
    caps.get(1).map(|name| name.as_str())
}

/// Split a line of concatenated assignments (`a = 1 b = a + 1`) into one
/// assignment per line.
///
/// A split happens before each top-level `identifier =` that follows an
/// assignment with a non-empty right-hand side. Lines that do not start with
/// an assignment are returned unchanged.
pub(crate) fn split_concatenated_assignments(line: &str) -> Vec<String> {
    let indent_len = line.len() - line.trim_start().len();
    let (indent, body) = line.split_at(indent_len);
    if assigned_name(body).is_none() {
        return vec![line.to_string()];
    }

    let top_level = top_level_mask(body);
    let mut cuts = Vec::new();
    let mut segment_start = 0;
    for candidate in ASSIGNMENT_CANDIDATE_RE.find_iter(body) {
        let start = candidate.start();
        if start == segment_start || !top_level[start] {
            continue;
        }
        if body[candidate.end()..].starts_with('=') {
            continue;
        }
        if !has_right_hand_side(&body[segment_start..start]) {
            continue;
        }
        cuts.push(start);
        segment_start = start;
    }

    let mut segments = Vec::with_capacity(cuts.len() + 1);
    let mut from = 0;
    for cut in cuts.into_iter().chain(std::iter::once(body.len())) {
        let segment = body[from..cut].trim_end();
        segments.push(format!("{indent}{segment}"));
        from = cut;
    }
    segments
}

/// Make `segment` end in a bare expression when it is an assignment.
///
/// `total = a + b total` becomes `total = a + b` / `total`, and a plain
/// `total = a + b` gains a trailing `total` line. The answer line always starts
/// at column 0 so it runs after any block the segment closes.
fn finish_with_expression(segment: &str) -> Vec<String> {
    let body = segment.trim_start();
    let indent = &segment[..segment.len() - body.len()];
    let Some(name) = assigned_name(body) else {
        return vec![segment.to_string()];
    };

    let code = body[..comment_start(body).unwrap_or(body.len())].trim_end();
    if let Some(caps) = TRAILING_IDENT_RE.captures(code) {
        let head = &caps["body"];
        let tail = &caps["tail"];
        if ends_complete_expression(head) && !KEYWORDS.contains(&tail) {
            let comment = &body[code.len()..];
            return vec![format!("{indent}{head}{comment}"), tail.to_string()];
        }
    }

    vec![segment.to_string(), name.to_string()]
}

fn has_right_hand_side(segment: &str) -> bool {
    segment
        .split_once('=')
        .is_some_and(|(_, rhs)| !rhs.trim().is_empty())
}

/// Whether `head` (an assignment) ends where an expression could end.
fn ends_complete_expression(head: &str) -> bool {
    if !has_right_hand_side(head) || !top_level_mask(head).last().copied().unwrap_or(false) {
        return false;
    }
    let Some(last) = head.chars().last() else {
        return false;
    };
    if !(last.is_alphanumeric() || matches!(last, '_' | ')' | ']' | '}' | '"' | '\'')) {
        return false;
    }
    let last_word = head
        .rsplit(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or_default();
    !KEYWORDS.contains(&last_word)
}

/// Byte offset of a `#` comment outside string literals.
fn comment_start(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if ch == '\\' => escaped = true,
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None if ch == '#' => return Some(idx),
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None => {}
        }
    }
    None
}

/// For each byte of `text`, whether it sits outside brackets, string literals
/// and comments.
fn top_level_mask(text: &str) -> Vec<bool> {
    let mut mask = vec![false; text.len()];
    let code_end = comment_start(text).unwrap_or(text.len());
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in text[..code_end].char_indices() {
        let before = depth == 0 && quote.is_none();
        match quote {
            Some(open) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == open {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth = depth.saturating_sub(1),
                _ => {}
            },
        }
        // Openers and closers count as top level so a closed call ends an expression.
        let top = before || (depth == 0 && quote.is_none());
        for slot in mask.iter_mut().skip(idx).take(ch.len_utf8()) {
            *slot = top;
        }
    }
    mask
}
