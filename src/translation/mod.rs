//! Rewriting of `:name` placeholders into numbered `$N` placeholders for drivers that only
//! understand positional parameters.

use std::borrow::Cow;

mod parsers;
mod scanner;

use parsers::{
    is_block_comment_end, is_block_comment_start, is_cast, is_line_comment_start, matches_tag,
    try_start_dollar_quote,
};
use scanner::{State, scan_ident};

/// SQL with its named placeholders replaced, plus the names in the order they were numbered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRewrite<'a> {
    pub sql: Cow<'a, str>,
    /// Distinct names in order of first appearance; `names[i]` became `$(first_number + i)`.
    pub names: Vec<String>,
}

/// Replace every `:name` placeholder with `$N`, numbering distinct names from `first_number`.
///
/// Repeated names reuse their number. Placeholders inside quoted strings, quoted identifiers,
/// comments and dollar-quoted blocks are left alone, as are `::` casts.
///
/// Warning: the scan is a lightweight state machine, not a SQL parser. Array slices written
/// as `arr[lo:hi]` with an identifier bound look like placeholders; write them with spaces
/// (`arr[lo : hi]`) or use positional parameters for such statements.
///
/// Returns a borrowed `Cow` when the statement has no named placeholders.
#[must_use]
pub fn rewrite_named_placeholders(sql: &str, first_number: usize) -> NamedRewrite<'_> {
    let mut out: Option<String> = None;
    let mut copied_upto = 0;
    let mut names: Vec<String> = Vec::new();
    let mut state = State::Normal;
    let mut idx = 0;
    let bytes = sql.as_bytes();

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, advance)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = advance;
                    }
                }
                b':' if is_cast(bytes, idx) => idx += 1,
                b':' => {
                    if let Some((end, name)) = scan_ident(bytes, idx + 1) {
                        let position = match names.iter().position(|n| n == name) {
                            Some(pos) => pos,
                            None => {
                                names.push(name.to_string());
                                names.len() - 1
                            }
                        };
                        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len()));
                        buf.push_str(&sql[copied_upto..idx]);
                        buf.push('$');
                        buf.push_str(&(first_number + position).to_string());
                        copied_upto = end;
                        idx = end - 1;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if matches_tag(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    let sql = match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied_upto..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    };
    NamedRewrite { sql, names }
}
