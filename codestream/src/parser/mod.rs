pub mod error;
mod structural;

pub use error::ParseError;
pub use structural::{BLOCK_END, BLOCK_START, HEADER_END};

use std::ops::Range;

use crate::signature::BlockSignature;

/// A block header and body as read from template text.
#[derive(Debug, Clone)]
pub struct ParsedBlock {
    pub signature: BlockSignature,
    /// Parameter names, normalized to start with `$`.
    pub parameters: Vec<String>,
    pub body: String,
    pub span: Range<usize>,
}

/// Parser entry point for one template file.
pub struct Parser {
    source: String,
    path: String,
    file_id: usize,
}

impl Parser {
    pub fn new(source: String, path: impl Into<String>, file_id: usize) -> Self {
        Parser {
            source,
            path: path.into(),
            file_id,
        }
    }

    /// Extract every code block, in declaration order.
    ///
    /// Stops at the first structural error; nothing after it is parsed.
    pub fn parse(&self) -> Result<Vec<ParsedBlock>, Vec<ParseError>> {
        structural::parse_blocks(&self.source, &self.path, self.file_id)
    }
}
