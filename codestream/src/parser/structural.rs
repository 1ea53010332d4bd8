use std::collections::HashMap;
use std::ops::Range;

use crate::parser::ParsedBlock;
use crate::parser::error::ParseError;
use crate::scan::{find_from, find_matching_close, parse_parameter_list};
use crate::signature::BlockSignature;

/// Opens a block header.
pub const BLOCK_START: &str = "/***";
/// Closes a block header and opens its body.
pub const HEADER_END: &str = "***/";
/// Closes a block body.
pub const BLOCK_END: &str = "/**/";

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse every `/*** header ***/ body /**/` block in `source`.
pub fn parse_blocks(
    source: &str,
    path: &str,
    file_id: usize,
) -> Result<Vec<ParsedBlock>, Vec<ParseError>> {
    let mut state = ParseState::new(source, path, file_id);
    while let Some(block) = state.next_block().map_err(|e| vec![e])? {
        state.push(block).map_err(|e| vec![e])?;
    }
    Ok(state.blocks)
}

// ---------------------------------------------------------------------------
// Parse state
// ---------------------------------------------------------------------------

struct ParseState<'a> {
    source: &'a str,
    path: &'a str,
    file_id: usize,
    /// Only moves forward.
    cursor: usize,
    seen: HashMap<BlockSignature, Range<usize>>,
    blocks: Vec<ParsedBlock>,
}

struct Header {
    name: String,
    parameters: Vec<String>,
    span: Range<usize>,
}

impl<'a> ParseState<'a> {
    fn new(source: &'a str, path: &'a str, file_id: usize) -> Self {
        ParseState {
            source,
            path,
            file_id,
            cursor: 0,
            seen: HashMap::new(),
            blocks: Vec::new(),
        }
    }

    fn next_block(&mut self) -> Result<Option<ParsedBlock>, ParseError> {
        let Some(header) = self.parse_header()? else {
            return Ok(None);
        };
        let (body, end) = self.parse_body(&header)?;

        tracing::trace!(
            path = self.path,
            block = %header.name,
            parameters = header.parameters.len(),
            "parsed code block"
        );

        Ok(Some(ParsedBlock {
            signature: BlockSignature::new(header.name, header.parameters.len()),
            parameters: header.parameters,
            body,
            span: header.span.start..end,
        }))
    }

    fn push(&mut self, block: ParsedBlock) -> Result<(), ParseError> {
        if let Some(first) = self.seen.get(&block.signature) {
            let line = line_of(self.source, first.start);
            return Err(self
                .error(
                    format!(
                        "Multiple code blocks have the same signature: {} in {}",
                        block.signature, self.path
                    ),
                    block.span.start..block.span.start + BLOCK_START.len(),
                )
                .with_note(format!("first declared on line {}", line)));
        }
        self.seen.insert(block.signature.clone(), block.span.clone());
        self.blocks.push(block);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Header
    // -----------------------------------------------------------------------

    fn parse_header(&mut self) -> Result<Option<Header>, ParseError> {
        let Some(start) = find_from(self.source, BLOCK_START, self.cursor) else {
            self.cursor = self.source.len();
            return Ok(None);
        };
        let name_start = start + BLOCK_START.len();
        let Some(header_end) = find_from(self.source, HEADER_END, name_start) else {
            return Err(self.error(
                format!("Missing code block close header in {}", self.path),
                start..name_start,
            ));
        };
        let span = start..header_end + HEADER_END.len();
        self.cursor = span.end;

        let source = self.source;
        let text = &source[name_start..header_end];
        let (name, parameters) = match text.find('(') {
            Some(paren) => {
                let Some(close) = find_matching_close(text, paren) else {
                    let at = name_start + paren;
                    return Err(self
                        .error(
                            format!("Missing close parenthesis in code block header in {}", self.path),
                            at..at + 1,
                        )
                        .with_note("parameter lists must end with `)` before `***/`"));
                };
                let raw = parse_parameter_list(text, paren, close);
                (text[..paren].trim(), self.normalize_parameters(raw, &span)?)
            }
            None => (text.trim(), Vec::new()),
        };

        if name.is_empty() {
            return Err(self.error(
                format!("Code block header without a name in {}", self.path),
                span,
            ));
        }

        Ok(Some(Header {
            name: name.to_string(),
            parameters,
            span,
        }))
    }

    /// Header parameters may be written with or without their `$`.
    fn normalize_parameters(
        &self,
        raw: Vec<String>,
        span: &Range<usize>,
    ) -> Result<Vec<String>, ParseError> {
        raw.into_iter()
            .map(|name| {
                if name.is_empty() || name == "$" {
                    Err(self.error(
                        format!("Empty parameter name in code block header in {}", self.path),
                        span.clone(),
                    ))
                } else if name.starts_with('$') {
                    Ok(name)
                } else {
                    Ok(format!("${}", name))
                }
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Body
    // -----------------------------------------------------------------------

    /// Returns the trimmed body and the offset just past its end marker.
    fn parse_body(&mut self, header: &Header) -> Result<(String, usize), ParseError> {
        let body_start = header.span.end;
        let mut scan = body_start;
        let mut depth = 1usize;

        let body_end = loop {
            let Some(close) = find_from(self.source, BLOCK_END, scan) else {
                return Err(self
                    .error(
                        format!("Missing close block in {}", self.path),
                        header.span.clone(),
                    )
                    .with_note(format!("every block must end with {}", BLOCK_END)));
            };
            match find_from(self.source, BLOCK_START, scan) {
                Some(nested) if nested < close => {
                    depth += 1;
                    scan = nested + BLOCK_START.len();
                }
                _ => {
                    depth -= 1;
                    if depth == 0 {
                        break close;
                    }
                    scan = close + BLOCK_END.len();
                }
            }
        };

        let end = body_end + BLOCK_END.len();
        self.cursor = end;
        Ok((trim_body(&self.source[body_start..body_end]), end))
    }

    fn error(&self, message: String, span: Range<usize>) -> ParseError {
        ParseError::error(message, span, self.file_id)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_blank(c: char) -> bool {
    matches!(c, '\n' | '\r' | ' ')
}

/// Strip surrounding blank lines and spaces. A body that had trailing blanks
/// keeps exactly one newline.
fn trim_body(raw: &str) -> String {
    let leading = raw.trim_start_matches(is_blank);
    let trimmed = leading.trim_end_matches(is_blank);
    let mut body = trimmed.to_string();
    if trimmed.len() < leading.len() {
        body.push('\n');
    }
    body
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())]
        .bytes()
        .filter(|&b| b == b'\n')
        .count()
        + 1
}
