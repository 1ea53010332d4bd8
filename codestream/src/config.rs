use std::path::PathBuf;

use serde::Deserialize;

/// Settings a code generator passes down to its streams.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Precede every template line with a directive naming its source line.
    pub source_line_binding: bool,
    pub line_directive: LineDirective,
    /// Extension of class-derived template files, without the dot.
    pub template_extension: String,
    /// Directory class-derived template paths are resolved against.
    pub template_root: PathBuf,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            source_line_binding: false,
            line_directive: LineDirective::default(),
            template_extension: "c".to_string(),
            template_root: PathBuf::from("."),
        }
    }
}

/// How a source-line binding is written into generated code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum LineDirective {
    /// `#line 12 "path/Ramp.c"`
    #[default]
    #[serde(rename = "c")]
    CPreprocessor,
    #[serde(rename = "none")]
    Disabled,
}

impl LineDirective {
    pub fn render(self, line: usize, file: &str) -> Option<String> {
        match self {
            LineDirective::CPreprocessor => Some(format!("#line {} \"{}\"", line, file)),
            LineDirective::Disabled => None,
        }
    }
}
