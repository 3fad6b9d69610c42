//! preg_match / preg_match_all on top of the `regex` crate
//!
//! ## PHP Semantics
//!
//! - Patterns carry delimiters and trailing modifiers (`/abc/i`, `{a+}x`).
//!   Bracket-style delimiters nest.
//! - Without `u` the subject is matched byte by byte; with `u` both pattern
//!   and subject are UTF-8 and an invalid subject fails with
//!   `PREG_BAD_UTF8_ERROR`.
//! - Named groups show up twice in the result: under their name, then under
//!   their number.
//! - `preg_match` drops trailing groups that did not participate; groups in
//!   the middle become `""` (or `["", -1]` with `PREG_OFFSET_CAPTURE`).
//! - Compiled patterns are cached per `RuntimeState` by their source bytes,
//!   up to `PCRE_CACHE_SIZE` entries. Patterns that fail to compile are not
//!   cached.
//!
//! Backtracking-only PCRE features (lookaround, backreferences, possessive
//! quantifiers) are rejected by the engine and reported as compile failures.
//!
//! ## References
//!
//! - `$PHP_SRC_PATH/ext/pcre/php_pcre.c` - pcre_get_compiled_regex_cache, php_pcre_match_impl

use crate::builtins::exception::PhpException;
use crate::core::array::ArrayData;
use crate::core::array_key::ArrayKey;
use crate::core::value::Val;
use crate::runtime::context::RuntimeState;
use crate::vm::error::VmError;
use regex::bytes::{Captures, Regex, RegexBuilder};
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;

pub const PREG_PATTERN_ORDER: i64 = 1;
pub const PREG_SET_ORDER: i64 = 2;
pub const PREG_OFFSET_CAPTURE: i64 = 256;
pub const PREG_UNMATCHED_AS_NULL: i64 = 512;

pub const PREG_NO_ERROR: i64 = 0;
pub const PREG_INTERNAL_ERROR: i64 = 1;
pub const PREG_BAD_UTF8_ERROR: i64 = 4;
pub const PREG_BAD_UTF8_OFFSET_ERROR: i64 = 5;

/// Reference: $PHP_SRC_PATH/ext/pcre/php_pcre.c - PCRE_CACHE_SIZE
const PCRE_CACHE_SIZE: usize = 4096;

/// Group names by index; most patterns have only a handful of groups
type GroupNames<'a> = SmallVec<[Option<&'a str>; 8]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    Empty,
    BadDelimiter,
    NoEndingDelimiter(u8),
    UnknownModifier(u8),
    Compile(String),
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::Empty => write!(f, "Empty regular expression"),
            PatternError::BadDelimiter => {
                write!(f, "Delimiter must not be alphanumeric, backslash, or NUL")
            }
            PatternError::NoEndingDelimiter(d) => {
                write!(f, "No ending delimiter '{}' found", *d as char)
            }
            PatternError::UnknownModifier(m) => write!(f, "Unknown modifier '{}'", *m as char),
            PatternError::Compile(msg) => write!(f, "Compilation failed: {}", msg),
        }
    }
}

impl std::error::Error for PatternError {}

/// A compiled PHP pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
    utf8: bool,
    /// `A`: a match must start exactly at the search offset
    anchored: bool,
}

impl Pattern {
    /// Parse delimiters and modifiers, then compile the body
    pub fn compile(pattern: &[u8]) -> Result<Pattern, PatternError> {
        let start = pattern
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .ok_or(PatternError::Empty)?;
        let delimiter = pattern[start];
        if delimiter.is_ascii_alphanumeric() || delimiter == b'\\' || delimiter == 0 {
            return Err(PatternError::BadDelimiter);
        }
        let closing = match delimiter {
            b'(' => b')',
            b'[' => b']',
            b'{' => b'}',
            b'<' => b'>',
            other => other,
        };

        let body_start = start + 1;
        let mut depth = 1usize;
        let mut i = body_start;
        let mut body_end = None;
        while i < pattern.len() {
            let b = pattern[i];
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == closing && closing != delimiter {
                depth -= 1;
                if depth == 0 {
                    body_end = Some(i);
                    break;
                }
            } else if b == closing {
                body_end = Some(i);
                break;
            } else if b == delimiter {
                depth += 1;
            }
            i += 1;
        }
        let body_end = body_end.ok_or(PatternError::NoEndingDelimiter(closing))?;
        let body = &pattern[body_start..body_end];

        let mut builder_flags = String::new();
        let mut utf8 = false;
        let mut anchored = false;
        for &m in &pattern[body_end + 1..] {
            match m {
                b'i' | b'm' | b's' | b'x' | b'U' => builder_flags.push(m as char),
                b'u' => utf8 = true,
                b'A' => anchored = true,
                // `$` already matches only at the very end
                b'D' => {}
                b'\n' | b'\r' | b' ' => {}
                other => return Err(PatternError::UnknownModifier(other)),
            }
        }

        let body = std::str::from_utf8(body)
            .map_err(|_| PatternError::Compile("pattern is not valid UTF-8".to_string()))?;
        let mut source = String::new();
        if !builder_flags.is_empty() {
            source.push_str(&format!("(?{})", builder_flags));
        }
        if !utf8 {
            source.push_str("(?-u)");
        }
        source.push_str(body);
        let regex = RegexBuilder::new(&source)
            .build()
            .map_err(|e| PatternError::Compile(e.to_string()))?;
        Ok(Pattern {
            regex,
            utf8,
            anchored,
        })
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Group names by index (index 0 is the whole match)
    fn group_names(&self) -> GroupNames<'_> {
        self.regex.capture_names().collect()
    }

    /// Leftmost match starting at or after `start`
    fn captures_at<'h>(&self, subject: &'h [u8], start: usize) -> Option<Captures<'h>> {
        let caps = self.regex.captures_at(subject, start)?;
        if self.anchored && caps.get(0).map(|m| m.start()) != Some(start) {
            return None;
        }
        Some(caps)
    }
}

/// Map a PHP offset (negative counts from the end) to a byte position
fn start_offset(subject: &[u8], offset: i64) -> Option<usize> {
    let len = subject.len() as i64;
    let start = if offset < 0 { (len + offset).max(0) } else { offset };
    if start > len { None } else { Some(start as usize) }
}

/// One group as a result value
fn group_value(subject: &[u8], caps: &Captures<'_>, index: usize, flags: i64) -> Val {
    let offset_capture = flags & PREG_OFFSET_CAPTURE != 0;
    let unmatched_null = flags & PREG_UNMATCHED_AS_NULL != 0;
    match caps.get(index) {
        Some(m) => {
            let text = Val::string(subject[m.start()..m.end()].to_vec());
            if offset_capture {
                Val::array(ArrayData::from_values(vec![text, Val::Int(m.start() as i64)]))
            } else {
                text
            }
        }
        None => {
            let text = if unmatched_null { Val::Null } else { Val::from("") };
            if offset_capture {
                Val::array(ArrayData::from_values(vec![text, Val::Int(-1)]))
            } else {
                text
            }
        }
    }
}

/// Highest participating group plus one
fn matched_count(caps: &Captures<'_>) -> usize {
    (0..caps.len())
        .rev()
        .find(|&i| caps.get(i).is_some())
        .map_or(0, |i| i + 1)
}

/// Result array for a single match (the `preg_match` / `PREG_SET_ORDER` shape)
fn match_set(subject: &[u8], caps: &Captures<'_>, names: &[Option<&str>], flags: i64) -> ArrayData {
    let limit = if flags & PREG_UNMATCHED_AS_NULL != 0 {
        caps.len()
    } else {
        matched_count(caps)
    };
    let mut out = ArrayData::new();
    for index in 0..limit {
        let value = group_value(subject, caps, index, flags);
        if let Some(Some(name)) = names.get(index) {
            out.set(ArrayKey::from(*name), value.clone());
        }
        out.set(ArrayKey::Int(index as i64), value);
    }
    out
}

enum Prepared {
    Ready(Rc<Pattern>, usize),
    Failed,
}

/// Reference: $PHP_SRC_PATH/ext/pcre/php_pcre.c - pcre_get_compiled_regex_cache_ex
fn cached_pattern(state: &mut RuntimeState, source: &[u8]) -> Result<Rc<Pattern>, PatternError> {
    if let Some(hit) = state.pcre_cache.get(source) {
        return Ok(Rc::clone(hit));
    }
    let compiled = Rc::new(Pattern::compile(source)?);
    if state.pcre_cache.len() >= PCRE_CACHE_SIZE {
        state.pcre_cache.clear();
    }
    state.pcre_cache.insert(source.to_vec(), Rc::clone(&compiled));
    Ok(compiled)
}

fn prepare(state: &mut RuntimeState, func: &str, pattern: &[u8], subject: &[u8], offset: i64) -> Prepared {
    state.preg_last_error = PREG_NO_ERROR;
    let compiled = match cached_pattern(state, pattern) {
        Ok(p) => p,
        Err(e) => {
            state.warning(&format!("{}(): {}", func, e));
            state.preg_last_error = PREG_INTERNAL_ERROR;
            return Prepared::Failed;
        }
    };
    let Some(start) = start_offset(subject, offset) else {
        state.preg_last_error = PREG_INTERNAL_ERROR;
        return Prepared::Failed;
    };
    if compiled.utf8 {
        if std::str::from_utf8(subject).is_err() {
            state.preg_last_error = PREG_BAD_UTF8_ERROR;
            return Prepared::Failed;
        }
        if start < subject.len() && (subject[start] & 0xC0) == 0x80 {
            state.preg_last_error = PREG_BAD_UTF8_OFFSET_ERROR;
            return Prepared::Failed;
        }
    }
    Prepared::Ready(compiled, start)
}

/// preg_match(string $pattern, string $subject, array &$matches = null, int $flags = 0, int $offset = 0): int|false
pub fn preg_match(
    state: &mut RuntimeState,
    pattern: &[u8],
    subject: &[u8],
    matches: Option<&mut Val>,
    flags: i64,
    offset: i64,
) -> Val {
    let (compiled, start) = match prepare(state, "preg_match", pattern, subject, offset) {
        Prepared::Ready(p, s) => (p, s),
        Prepared::Failed => return Val::Bool(false),
    };
    let names = compiled.group_names();
    let caps = compiled.captures_at(subject, start);
    let found = caps.is_some();
    if let Some(out) = matches {
        *out = Val::array(match &caps {
            Some(caps) => match_set(subject, caps, &names, flags),
            None => ArrayData::new(),
        });
    }
    Val::Int(found as i64)
}

/// preg_match_all(string $pattern, string $subject, array &$matches = null, int $flags = 0, int $offset = 0): int|false
pub fn preg_match_all(
    state: &mut RuntimeState,
    pattern: &[u8],
    subject: &[u8],
    matches: Option<&mut Val>,
    flags: i64,
    offset: i64,
) -> Result<Val, VmError> {
    let order = flags & 0xff;
    if order > PREG_SET_ORDER {
        return Err(VmError::Exception(PhpException::with_class(
            "ValueError",
            "preg_match_all(): Argument #4 ($flags) must be a PREG_* constant",
        )));
    }
    let (compiled, start) = match prepare(state, "preg_match_all", pattern, subject, offset) {
        Prepared::Ready(p, s) => (p, s),
        Prepared::Failed => return Ok(Val::Bool(false)),
    };
    let names = compiled.group_names();

    let mut all = Vec::new();
    let mut pos = start;
    while pos <= subject.len() {
        let Some(caps) = compiled.captures_at(subject, pos) else {
            break;
        };
        let (m_start, m_end) = match caps.get(0) {
            Some(m) => (m.start(), m.end()),
            None => break,
        };
        pos = if m_end > m_start {
            m_end
        } else {
            m_end + char_width(subject, m_end, compiled.utf8)
        };
        all.push(caps);
    }

    let count = all.len() as i64;
    if let Some(out) = matches {
        let result = if order == PREG_SET_ORDER {
            ArrayData::from_values(
                all.iter()
                    .map(|caps| Val::array(match_set(subject, caps, &names, flags))),
            )
        } else {
            pattern_order(subject, &all, &names, flags)
        };
        *out = Val::array(result);
    }
    Ok(Val::Int(count))
}

fn pattern_order(subject: &[u8], all: &[Captures<'_>], names: &[Option<&str>], flags: i64) -> ArrayData {
    let mut out = ArrayData::new();
    for (index, name) in names.iter().enumerate() {
        let column = ArrayData::from_values(
            all.iter().map(|caps| group_value(subject, caps, index, flags)),
        );
        let column = Val::array(column);
        if let Some(name) = name {
            out.set(ArrayKey::from(*name), column.clone());
        }
        out.set(ArrayKey::Int(index as i64), column);
    }
    out
}

/// Step past one character after an empty match
fn char_width(subject: &[u8], pos: usize, utf8: bool) -> usize {
    if !utf8 {
        return 1;
    }
    match subject.get(pos) {
        Some(&b) if b >= 0xF0 => 4,
        Some(&b) if b >= 0xE0 => 3,
        Some(&b) if b >= 0xC0 => 2,
        _ => 1,
    }
}

/// preg_last_error(): int
pub fn preg_last_error(state: &RuntimeState) -> i64 {
    state.preg_last_error
}

/// preg_last_error_msg(): string
pub fn preg_last_error_msg(state: &RuntimeState) -> &'static str {
    match state.preg_last_error {
        PREG_NO_ERROR => "No error",
        PREG_INTERNAL_ERROR => "Internal error",
        PREG_BAD_UTF8_ERROR => "Malformed UTF-8 characters, possibly incorrectly encoded",
        PREG_BAD_UTF8_OFFSET_ERROR => {
            "The offset did not correspond to the beginning of a valid UTF-8 code point"
        }
        _ => "Unknown error",
    }
}
