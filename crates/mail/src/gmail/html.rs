//! HTML handling for message bodies
//!
//! Body text comes from `html2text`. The small entity decoder below is only
//! for attribute values pulled out of raw markup (image `src` URLs).

use log::warn;
use std::iter::Peekable;
use std::str::Chars;

/// Line width handed to the renderer
const WRAP_WIDTH: usize = 120;

/// Longest entity name we try to decode (`&thetasym;` and friends)
const MAX_ENTITY_LEN: usize = 10;

/// Render an HTML document as plain text, keeping line structure.
///
/// Trailing whitespace is trimmed per line, runs of blank lines collapse to
/// one and non-breaking spaces become plain spaces. Input the renderer
/// cannot cope with yields an empty string.
pub fn strip_html(html: &str) -> String {
    match std::panic::catch_unwind(|| html2text::from_read(html.as_bytes(), WRAP_WIDTH)) {
        Ok(rendered) => tidy_lines(&rendered.replace('\u{a0}', " ")),
        Err(_) => {
            warn!("HTML renderer failed on a {} byte body", html.len());
            String::new()
        }
    }
}

/// Trim line ends, keep at most one blank line in a row and trim the edges
fn tidy_lines(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim_end) {
        if line.is_empty() && lines.last().is_none_or(|last| last.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Decode entities in text that carries no markup (attribute values).
/// Unknown or unterminated entities are kept verbatim.
pub fn decode_html_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '&' {
            out.push_str(&read_entity(&mut chars));
        } else {
            out.push(ch);
        }
    }
    out
}

/// Decode the entity following a `&`, or return the raw text if it isn't one
fn read_entity(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if name.len() >= MAX_ENTITY_LEN || !(c.is_ascii_alphanumeric() || c == '#') {
            break;
        }
        name.push(c);
        chars.next();
    }

    if chars.peek() == Some(&';')
        && let Some(decoded) = decode_entity(&name)
    {
        chars.next();
        return decoded.to_string();
    }
    format!("&{}", name)
}

fn decode_entity(name: &str) -> Option<char> {
    let named = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        _ => {
            let num = name.strip_prefix('#')?;
            let codepoint = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            // NUL, controls and surrogates never reach the output
            return Some(
                char::from_u32(codepoint)
                    .filter(|c| !c.is_control() || c.is_whitespace())
                    .unwrap_or(char::REPLACEMENT_CHARACTER),
            );
        }
    };
    Some(named)
}
