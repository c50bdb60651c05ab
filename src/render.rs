//! Single-line rendering for diagnostics.
//!
//! Messages produced here end up inside other messages (thread tags,
//! composite await reports), so everything is flattened to one line:
//! control characters are escaped and cause chains are joined with ` <= `.

use std::error::Error as StdError;
use std::fmt::{Debug, Display};

/// Renders a value on one line, escaping `\r`, `\n` and `\t`.
#[must_use]
pub fn line(value: &dyn Display) -> String {
    visible(&value.to_string())
}

/// Renders an error and its whole source chain on one line.
///
/// ```
/// use crossunit::render::chain;
/// use crossunit::Error;
///
/// let err = Error::assertion("outer").with_source(std::io::Error::other("inner"));
/// assert_eq!(chain(&err), "Assertion: outer <= inner");
/// ```
#[must_use]
pub fn chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut next = err.source();
    while let Some(source) = next {
        out.push_str(" <= ");
        out.push_str(&source.to_string());
        next = source.source();
    }
    visible(&out)
}

/// Formats an `expected:<..>, but was:<..>` message.
///
/// Type labels are appended for everything except strings, which render
/// unambiguously on their own.
#[must_use]
pub fn expected_actual<E, A>(expected: &E, actual: &A, what: &str) -> String
where
    E: Debug + ?Sized,
    A: Debug + ?Sized,
{
    format!(
        "{what}: expected:<{}>{}, but was:<{}>{}",
        debug_line(expected),
        type_label::<E>(),
        debug_line(actual),
        type_label::<A>(),
    )
}

/// Shortens a type path to its last segments: `alloc::vec::Vec<i32>` becomes
/// `Vec<i32>`.
#[must_use]
pub fn short_type_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut segment_start = 0;
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            out.truncate(segment_start);
        } else if c.is_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push(c);
            segment_start = out.len();
        }
    }
    out
}

/// Short type name of `T`.
#[must_use]
pub fn type_name_of<T: ?Sized>() -> String {
    short_type_name(std::any::type_name::<T>())
}

fn debug_line<T: Debug + ?Sized>(value: &T) -> String {
    let rendered = format!("{value:?}");
    let unquoted = rendered
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(&rendered);
    visible(unquoted)
}

fn type_label<T: ?Sized>() -> String {
    let name = type_name_of::<T>();
    match name.trim_start_matches('&') {
        "str" | "String" => String::new(),
        _ => format!(" ({name})"),
    }
}

fn visible(s: &str) -> String {
    s.replace('\r', "\\r")
        .replace('\n', "\\n")
        .replace('\t', "\\t")
        .trim()
        .to_owned()
}
