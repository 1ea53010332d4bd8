//! Parenthesis-aware scanning shared by the block header parser, the
//! `$this`/`$super` resolver and the macro expander.
//!
//! All delimiters handled here are ASCII, so scanning works on bytes and every
//! index returned is a valid `char` boundary of the input.

// ---------------------------------------------------------------------------
// Matching delimiters
// ---------------------------------------------------------------------------

/// Index of the `)` that pairs with the `(` at `open`.
///
/// Returns `None` when `text[open]` is not `(` or the parentheses never
/// balance.
pub fn find_matching_close(text: &str, open: usize) -> Option<usize> {
    find_matching_close_with(text, open, b'(', b')')
}

/// Like [`find_matching_close`], for an arbitrary pair of ASCII delimiters.
pub fn find_matching_close_with(
    text: &str,
    open: usize,
    open_symbol: u8,
    close_symbol: u8,
) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&open_symbol) {
        return None;
    }

    let mut depth = 0usize;
    for (index, &byte) in bytes.iter().enumerate().skip(open) {
        if byte == open_symbol {
            depth += 1;
        } else if byte == close_symbol {
            depth -= 1;
            if depth == 0 {
                return Some(index);
            }
        }
    }
    None
}

/// First occurrence of `delimiter` at or after `from` that is not nested
/// inside a `(...)` pair.
///
/// Alternates between scanning for the delimiter and for the next `(`; when a
/// paren comes first the whole group is skipped. An unbalanced `(` before the
/// delimiter yields `None` rather than a guess.
pub fn index_of_outside_parens(delimiter: char, text: &str, from: usize) -> Option<usize> {
    let mut cursor = from;
    loop {
        let rest = text.get(cursor..)?;
        let found = cursor + rest.find(delimiter)?;
        match rest.find('(').map(|offset| cursor + offset) {
            Some(open) if open < found => {
                cursor = find_matching_close(text, open)? + 1;
            }
            _ => return Some(found),
        }
    }
}

/// Index of the first occurrence of `needle` at or after `from`.
pub(crate) fn find_from(text: &str, needle: &str, from: usize) -> Option<usize> {
    text.get(from..)?.find(needle).map(|offset| from + offset)
}

// ---------------------------------------------------------------------------
// Parameter lists
// ---------------------------------------------------------------------------

/// Split the parenthesized parameter list found in `text[start..end]`.
///
/// See [`parse_parameter_list_with`].
pub fn parse_parameter_list(text: &str, start: usize, end: usize) -> Vec<String> {
    parse_parameter_list_with(text, start, end, '(', ')')
}

/// Split a delimited, comma separated list into trimmed items.
///
/// The list begins after the first `open` at or after `start` and ends at the
/// last `close` at or before `end`. When `open` is missing (or lies past
/// `end`) the list begins at `start`; when `close` is missing it ends at
/// `end`. Commas nested inside parentheses do not split.
///
/// A blank region yields no items, while `n` bare commas yield `n + 1` empty
/// items: an item is kept when it is non-empty or when earlier items exist.
/// An item whose `open`/`close` counts differ is merged with the next one.
pub fn parse_parameter_list_with(
    text: &str,
    start: usize,
    end: usize,
    open: char,
    close: char,
) -> Vec<String> {
    let mut items = Vec::new();

    let mut start_index = text
        .get(start..)
        .and_then(|rest| rest.find(open))
        .map(|offset| start + offset + open.len_utf8())
        .unwrap_or(start);
    if start_index > end {
        start_index = start;
    }

    let window = text.len().min(end.saturating_add(1));
    let end_index = text
        .as_bytes()
        .get(..window)
        .and_then(|bytes| {
            let mut buf = [0u8; 4];
            let close = close.encode_utf8(&mut buf).as_bytes();
            bytes.windows(close.len()).rposition(|w| w == close)
        })
        .unwrap_or(end)
        .min(text.len());

    if start_index > end_index {
        return items;
    }

    let mut comma = index_of_outside_parens(',', text, start_index);
    while let Some(at) = comma {
        if at >= end_index {
            break;
        }
        let Some(item) = text.get(start_index..at) else {
            break;
        };
        let item = item.trim();
        if item.matches(open).count() == item.matches(close).count() {
            items.push(item.to_string());
            start_index = at + 1;
        }
        comma = index_of_outside_parens(',', text, at + 1);
    }

    if let Some(last) = text.get(start_index..end_index) {
        let last = last.trim();
        if !last.is_empty() || !items.is_empty() {
            items.push(last.to_string());
        }
    }
    items
}

/// Split a macro argument string on top-level commas.
///
/// Items are trimmed. A single trailing empty item (from a trailing comma or
/// blank input) is dropped.
pub fn parse_list(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut start = 0;
    while let Some(comma) = index_of_outside_parens(',', text, start) {
        items.push(text[start..comma].trim().to_string());
        start = comma + 1;
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        items.push(last.to_string());
    }
    items
}
