//! Turning template files into the text the block parser sees.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::StreamConfig;
use crate::error::CodeStreamError;
use crate::scan::parse_parameter_list_with;

/// Read a template file, or `None` if it does not exist.
///
/// When line binding is on, each line is preceded by its line directive.
pub fn read_template(path: &Path, config: &StreamConfig) -> Result<Option<String>, CodeStreamError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CodeStreamError::Io {
                path: path.display().to_string(),
                source: e,
            });
        }
    };

    if config.source_line_binding {
        Ok(Some(bind_source_lines(&text, &path.display().to_string(), config)))
    } else {
        Ok(Some(text))
    }
}

/// Interleave a line directive before every line of `text`.
pub fn bind_source_lines(text: &str, file: &str, config: &StreamConfig) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for (index, line) in text.lines().enumerate() {
        if let Some(directive) = config.line_directive.render(index + 1, file) {
            out.push_str(&directive);
            out.push('\n');
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Template file for a fully-qualified class name: `a.b.C` becomes
/// `<root>/a/b/C.<ext>`.
pub fn class_template_path(config: &StreamConfig, class_name: &str) -> PathBuf {
    let mut path = config.template_root.clone();
    for part in class_name.split('.') {
        path.push(part);
    }
    path.set_extension(&config.template_extension);
    path
}

/// Substitute file-wide template arguments.
///
/// The first `<...>` list in `text` names the template parameters; each one is
/// replaced everywhere in the file by the argument at the same position.
/// Names are matched with their `$` sigil, which is added when omitted.
pub fn apply_template_arguments(
    text: &str,
    path: &str,
    arguments: &[String],
) -> Result<String, CodeStreamError> {
    let Some(close) = text.find('>') else {
        return Err(CodeStreamError::TemplateArguments {
            path: path.to_string(),
            message: "no <...> template parameter list".to_string(),
        });
    };
    let parameters: Vec<String> = parse_parameter_list_with(text, 0, close, '<', '>')
        .into_iter()
        .map(|name| {
            if name.starts_with('$') {
                name
            } else {
                format!("${}", name)
            }
        })
        .collect();

    if parameters.len() != arguments.len() {
        return Err(CodeStreamError::TemplateArguments {
            path: path.to_string(),
            message: format!(
                "{} template parameter(s) declared, {} argument(s) given",
                parameters.len(),
                arguments.len()
            ),
        });
    }

    Ok(substitute_parameters(text, &parameters, arguments))
}

/// Replace every `$name` in `text` with the argument at the same position.
///
/// Single pass: at each `$` the longest matching name wins, and replacement
/// text is never rescanned.
pub fn substitute_parameters(text: &str, parameters: &[String], arguments: &[String]) -> String {
    if parameters.is_empty() {
        return text.to_string();
    }

    let mut by_length: Vec<usize> = (0..parameters.len().min(arguments.len())).collect();
    by_length.sort_by_key(|&i| std::cmp::Reverse(parameters[i].len()));

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let tail = &rest[dollar..];
        match by_length
            .iter()
            .find(|&&i| !parameters[i].is_empty() && tail.starts_with(parameters[i].as_str()))
        {
            Some(&i) => {
                out.push_str(&arguments[i]);
                rest = &tail[parameters[i].len()..];
            }
            None => {
                out.push('$');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
