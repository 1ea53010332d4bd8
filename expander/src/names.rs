//! Name sanitizing shared by macro handlers and model adapters.

const ESCAPES: &[(&str, &str)] = &[
    ("$", "_X_DOLLAR_X_"),
    ("-", "_X_MINUS_X_"),
    ("*", "_X_STAR_X_"),
    ("[", "_X_LBRACKET_X_"),
    ("]", "_X_RBRACKET_X_"),
    ("+", "_X_PLUS_X_"),
    ("\\", "_X_BACKSLASH_X_"),
    ("/", "_X_FORWARDSLASH_X_"),
    ("^", "_X_CARET_X_"),
    (",", "_X_COMA_X_"),
];

const SPACE_ESCAPE: &str = "_X_SPACE_X";

/// Reversibly replace characters that would confuse macro expansion.
///
/// Names made only of identifier characters are returned unchanged.
pub fn escape_name(name: &str) -> String {
    if name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return name.to_string();
    }
    ESCAPES
        .iter()
        .fold(name.to_string(), |acc, (raw, escaped)| acc.replace(raw, escaped))
}

/// Inverse of [`escape_name`].
pub fn unescape_name(name: &str) -> String {
    if !name.contains("_X_") {
        return name.to_string();
    }
    ESCAPES
        .iter()
        .fold(name.to_string(), |acc, (raw, escaped)| acc.replace(escaped, raw))
}

/// [`escape_name`], additionally escaping spaces.
pub fn escape_port_name(name: &str) -> String {
    escape_name(name).replace(' ', SPACE_ESCAPE)
}

/// Inverse of [`escape_port_name`].
pub fn unescape_port_name(name: &str) -> String {
    unescape_name(&name.replace(SPACE_ESCAPE, " "))
}

/// Identifier for a model object's full name: every character that cannot
/// appear in an identifier becomes `_`, so `.model.Ramp 2` gives
/// `_model_Ramp_2`.
pub fn generate_name(full_name: &str) -> String {
    let mut name: String = full_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Split `port` or `port#channel`; the channel defaults to `"0"`.
///
/// Returns `None` for a list (a top-level comma), which is never a port.
pub fn parse_port_channel(reference: &str) -> Option<(&str, &str)> {
    if codestream::scan::index_of_outside_parens(',', reference, 0).is_some() {
        return None;
    }
    match reference.split_once('#') {
        Some((port, channel)) => Some((port.trim(), channel.trim())),
        None => Some((reference.trim(), "0")),
    }
}
