//! Reader and writer for `.properties` text.
//!
//! Follows the usual conventions: `#`/`!` comments, `=`, `:` or whitespace
//! between key and value, trailing-backslash continuation lines and
//! `\t \n \r \f \uXXXX` escapes. Inside keys `\.`, `\[`, `\]` and `\\` are
//! kept escaped so the path parser can tell a literal dot from a separator.

use crate::error::CodecError;

pub fn parse(text: &str) -> Result<Vec<(String, String)>, CodecError> {
    let mut entries = Vec::new();
    let mut lines = text.lines().enumerate();

    while let Some((index, raw)) = lines.next() {
        let line_no = index + 1;
        let trimmed = raw.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        let mut logical = trimmed.to_string();
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let (key, value) = split_entry(&logical);
        entries.push((unescape(key, line_no, true)?, unescape(value, line_no, false)?));
    }

    Ok(entries)
}

pub fn render(entries: &[(String, String)]) -> String {
    let mut out = String::new();
    for (key, value) in entries {
        for c in key.chars() {
            if matches!(c, ' ' | '=' | ':' | '#' | '!') {
                out.push('\\');
            }
            out.push(c);
        }
        out.push_str(" = ");
        for (i, c) in value.chars().enumerate() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                ' ' if i == 0 => out.push_str("\\ "),
                other => out.push(other),
            }
        }
        out.push('\n');
    }
    out
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..i], line[i + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[i..].trim_start();
                let rest = rest
                    .strip_prefix(['=', ':'])
                    .map(str::trim_start)
                    .unwrap_or(rest);
                return (&line[..i], rest);
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(raw: &str, line: usize, keep_path_escapes: bool) -> Result<String, CodecError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or_else(|| CodecError::ParseProperties {
                        line,
                        message: format!("malformed \\u escape '\\u{}'", hex),
                    })?;
                out.push(decoded);
            }
            Some(c @ ('.' | '[' | ']' | '\\')) if keep_path_escapes => {
                out.push('\\');
                out.push(c);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    Ok(out)
}
