use crate::parser::ParseError;
use crate::signature::BlockSignature;

/// Everything that can go wrong while loading templates or resolving blocks.
#[derive(Debug, thiserror::Error)]
pub enum CodeStreamError {
    #[error("Cannot open file: {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", join_messages(.errors))]
    Parse {
        path: String,
        errors: Vec<ParseError>,
    },

    #[error("Multiple code blocks have the same signature: {signature} in {path}")]
    DuplicateSignature {
        signature: BlockSignature,
        path: String,
    },

    #[error(
        "Cannot find code block: \"{signature}\" in \"{path}\", the initial path was \"{original_path}\"."
    )]
    BlockNotFound {
        signature: BlockSignature,
        path: String,
        original_path: String,
    },

    #[error("Cannot find {kind} block for {signature} in \"{path}\"")]
    SuperThisNotFound {
        kind: CallKind,
        signature: BlockSignature,
        path: String,
    },

    #[error("{signature} recursively appends itself in {path}")]
    RecursiveAppend {
        signature: BlockSignature,
        path: String,
    },

    #[error("{signature} contains an ill-formatted ${kind}()")]
    IllFormattedCall {
        kind: CallKind,
        signature: BlockSignature,
    },

    #[error("{name} -- is a code block that is appended by default.")]
    DefaultBlock { name: String },

    #[error("Template arguments for \"{path}\": {message}")]
    TemplateArguments { path: String, message: String },

    #[error("insert offset {offset} is out of bounds for output of length {len}")]
    InsertOutOfBounds { offset: usize, len: usize },

    #[error("invalid code block name pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("code block expansion nested deeper than {0} levels")]
    RecursionLimit(usize),
}

/// Which block-call form a `$this`/`$super` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    This,
    Super,
}

impl CallKind {
    pub fn keyword(self) -> &'static str {
        match self {
            CallKind::This => "this",
            CallKind::Super => "super",
        }
    }
}

impl std::fmt::Display for CallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

fn join_messages(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
