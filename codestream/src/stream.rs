use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use codespan_reporting::files::SimpleFiles;
use regex::Regex;

use crate::config::StreamConfig;
use crate::error::{CallKind, CodeStreamError};
use crate::parser::{BLOCK_END, BLOCK_START, HEADER_END, Parser};
use crate::scan::{find_matching_close, parse_parameter_list};
use crate::signature::BlockSignature;
use crate::source::{apply_template_arguments, class_template_path, read_template, substitute_parameters};
use crate::table::CodeBlockTable;

const MAX_DEPTH: usize = 256;

/// Blocks the generator framework appends on its own. Appending one of these
/// explicitly, with no arguments, from an adapter's stream would emit it twice.
pub const DEFAULT_BLOCKS: &[&str] = &[
    "preinitBlock",
    "initBlock",
    "fireBlock",
    "postfireBlock",
    "wrapupBlock",
];

/// Where a scope's template text comes from.
#[derive(Debug, Clone)]
enum TemplateOrigin {
    Text { path: String, text: String },
    File { path: PathBuf, may_not_exist: bool },
    ClassChain { classes: Vec<String>, may_not_exist: bool },
}

/// Reads code blocks from templates and accumulates resolved block text.
///
/// Templates are registered up front and parsed lazily, on the first block
/// request, into a [`CodeBlockTable`] with one scope per file, most derived
/// first. [`reset`] drops the table so the next request parses again;
/// [`clear`] only empties the output.
///
/// [`reset`]: CodeStream::reset
/// [`clear`]: CodeStream::clear
pub struct CodeStream {
    config: StreamConfig,
    origins: Vec<TemplateOrigin>,
    template_arguments: Option<Vec<String>>,
    /// Enables the default-block guard in `append_code_block`.
    adapter_owned: bool,
    table: CodeBlockTable,
    parsed: bool,
    output: String,
    /// Source texts of the current parse, for rendering diagnostics.
    files: SimpleFiles<String, String>,
}

impl CodeStream {
    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// A stream with no templates; add some with the `parse_*` methods.
    pub fn new(config: StreamConfig) -> Self {
        CodeStream {
            config,
            origins: Vec::new(),
            template_arguments: None,
            adapter_owned: false,
            table: CodeBlockTable::new(),
            parsed: false,
            output: String::new(),
            files: SimpleFiles::new(),
        }
    }

    /// A stream over in-memory template text. `path` is used in messages.
    pub fn from_text(config: StreamConfig, path: impl Into<String>, text: impl Into<String>) -> Self {
        let mut stream = CodeStream::new(config);
        stream.origins.push(TemplateOrigin::Text {
            path: path.into(),
            text: text.into(),
        });
        stream
    }

    /// A stream over one template file.
    pub fn from_file(config: StreamConfig, path: impl AsRef<Path>, may_not_exist: bool) -> Self {
        let mut stream = CodeStream::new(config);
        stream.origins.push(TemplateOrigin::File {
            path: path.as_ref().to_path_buf(),
            may_not_exist,
        });
        stream
    }

    /// A stream for an adapter whose class chain is `classes`, most derived
    /// first.
    ///
    /// Each class `a.b.C` reads `<template_root>/a/b/C.<ext>`. The derived
    /// class's file may only be missing when `may_not_exist` is set; missing
    /// ancestors are skipped. Only files that exist add a scope.
    pub fn for_class_chain<S: AsRef<str>>(config: StreamConfig, classes: &[S], may_not_exist: bool) -> Self {
        let mut stream = CodeStream::new(config);
        stream.adapter_owned = true;
        stream.origins.push(TemplateOrigin::ClassChain {
            classes: classes.iter().map(|c| c.as_ref().to_string()).collect(),
            may_not_exist,
        });
        stream
    }

    /// Substitute `arguments` for the `<...>` template parameters of every
    /// file before its blocks are parsed.
    pub fn with_template_arguments(mut self, arguments: Vec<String>) -> Self {
        self.template_arguments = Some(arguments);
        self.parsed = false;
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    /// Add `text` as a new scope, farther than every existing one.
    pub fn parse_text(&mut self, path: impl Into<String>, text: impl Into<String>) -> Result<(), CodeStreamError> {
        self.add_origin(TemplateOrigin::Text {
            path: path.into(),
            text: text.into(),
        })
    }

    /// Add a template file as a new scope, farther than every existing one.
    ///
    /// A missing file is an error unless `may_not_exist` is set, in which case
    /// no scope is added.
    pub fn parse_file(&mut self, path: impl AsRef<Path>, may_not_exist: bool) -> Result<(), CodeStreamError> {
        self.add_origin(TemplateOrigin::File {
            path: path.as_ref().to_path_buf(),
            may_not_exist,
        })
    }

    fn add_origin(&mut self, origin: TemplateOrigin) -> Result<(), CodeStreamError> {
        self.ensure_parsed()?;
        match self.load(&origin) {
            Ok(()) => {
                self.origins.push(origin);
                Ok(())
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// Parse every registered template if the table is stale.
    pub fn ensure_parsed(&mut self) -> Result<(), CodeStreamError> {
        if self.parsed {
            return Ok(());
        }
        self.table.clear();
        self.files = SimpleFiles::new();
        let origins = std::mem::take(&mut self.origins);
        let result = origins.iter().try_for_each(|origin| self.load(origin));
        self.origins = origins;
        match result {
            Ok(()) => {
                self.parsed = true;
                Ok(())
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    fn load(&mut self, origin: &TemplateOrigin) -> Result<(), CodeStreamError> {
        match origin {
            TemplateOrigin::Text { path, text } => self.parse_scope(path, text.clone()),
            TemplateOrigin::File { path, may_not_exist } => self.load_file(path, *may_not_exist),
            TemplateOrigin::ClassChain { classes, may_not_exist } => {
                for (index, class) in classes.iter().enumerate() {
                    let path = class_template_path(&self.config, class);
                    // Ancestor templates are optional.
                    self.load_file(&path, index > 0 || *may_not_exist)?;
                }
                Ok(())
            }
        }
    }

    fn load_file(&mut self, path: &Path, may_not_exist: bool) -> Result<(), CodeStreamError> {
        match read_template(path, &self.config)? {
            Some(text) => self.parse_scope(&path.display().to_string(), text),
            None if may_not_exist => {
                tracing::debug!(path = %path.display(), "template file not found, skipping");
                Ok(())
            }
            None => Err(CodeStreamError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such template file"),
            }),
        }
    }

    fn parse_scope(&mut self, path: &str, text: String) -> Result<(), CodeStreamError> {
        let text = match &self.template_arguments {
            Some(arguments) => apply_template_arguments(&text, path, arguments)?,
            None => text,
        };
        let file_id = self.files.add(path.to_string(), text.clone());
        let blocks = Parser::new(text, path, file_id)
            .parse()
            .map_err(|errors| CodeStreamError::Parse {
                path: path.to_string(),
                errors,
            })?;

        let scope = self.table.add_scope(path);
        tracing::debug!(path, scope, blocks = blocks.len(), "parsed template");
        for block in blocks {
            self.table
                .put_parameters(scope, block.signature.clone(), block.parameters)?;
            self.table
                .put_code(scope, &block.signature, block.body, block.span, file_id)?;
        }
        Ok(())
    }

    /// Discard the parsed table; the next block request parses again.
    pub fn reset(&mut self) {
        self.table.clear();
        self.parsed = false;
    }

    /// The parsed table, parsing first if needed.
    pub fn table(&mut self) -> Result<&CodeBlockTable, CodeStreamError> {
        self.ensure_parsed()?;
        Ok(&self.table)
    }

    /// Source texts registered for diagnostics, indexed by `ParseError::file_id`.
    pub fn files(&self) -> &SimpleFiles<String, String> {
        &self.files
    }

    // -----------------------------------------------------------------------
    // Block resolution
    // -----------------------------------------------------------------------

    /// Resolve the block `name` called with `arguments`.
    ///
    /// A missing block yields `""` when `may_not_exist` is set.
    pub fn get_code_block(
        &mut self,
        name: &str,
        arguments: &[String],
        may_not_exist: bool,
    ) -> Result<String, CodeStreamError> {
        let signature = BlockSignature::new(name, arguments.len());
        self.get_block(&signature, Some(arguments), may_not_exist)
    }

    /// Resolve a block by signature.
    ///
    /// With `arguments`, parameters are substituted and `$this`/`$super` calls
    /// resolved. Without, the raw body is returned untouched.
    pub fn get_block(
        &mut self,
        signature: &BlockSignature,
        arguments: Option<&[String]>,
        may_not_exist: bool,
    ) -> Result<String, CodeStreamError> {
        self.ensure_parsed()?;
        let resolver = Resolver { table: &self.table, origin: self.origin_path() };
        resolver.resolve(0, signature, arguments, may_not_exist, 0)
    }

    /// `name` and `arguments` with the default-block guard, indented by
    /// `indent_level` and appended to the output.
    pub fn append_code_block(
        &mut self,
        name: &str,
        arguments: &[String],
        may_not_exist: bool,
        indent_level: usize,
    ) -> Result<(), CodeStreamError> {
        if self.adapter_owned && !may_not_exist && arguments.is_empty() && DEFAULT_BLOCKS.contains(&name) {
            return Err(CodeStreamError::DefaultBlock {
                name: name.to_string(),
            });
        }
        let code = self.get_code_block(name, arguments, may_not_exist)?;
        tracing::debug!(block = name, arguments = arguments.len(), "appending code block");
        self.output.push_str(&indent(indent_level, &code));
        Ok(())
    }

    /// Append every zero-parameter block whose whole name matches `pattern`.
    ///
    /// Matches are appended in signature order.
    pub fn append_code_blocks(&mut self, pattern: &str) -> Result<(), CodeStreamError> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        let matching: Vec<BlockSignature> = self
            .table()?
            .signatures()
            .into_iter()
            .filter(|sig| sig.parameter_count() == 0 && regex.is_match(sig.name()))
            .collect();
        for signature in matching {
            let code = self.get_block(&signature, Some(&[] as &[String]), false)?;
            self.output.push_str(&code);
        }
        Ok(())
    }

    /// The unsubstituted block wrapped in its own header and end marker, or
    /// `""` if no scope declares `signature`.
    pub fn get_code_block_template(&mut self, signature: &BlockSignature) -> Result<String, CodeStreamError> {
        let table = self.table()?;
        let Some((_, entry)) = table.lookup(signature) else {
            return Ok(String::new());
        };
        Ok(render_template(signature.name(), &entry.parameters, &entry.body))
    }

    /// Names of every block in every scope, sorted and deduplicated.
    pub fn all_code_block_names(&mut self) -> Result<Vec<String>, CodeStreamError> {
        let names: BTreeSet<String> = self
            .table()?
            .signatures()
            .into_iter()
            .map(|sig| sig.name().to_string())
            .collect();
        Ok(names.into_iter().collect())
    }

    pub fn all_code_block_signatures(&mut self) -> Result<BTreeSet<BlockSignature>, CodeStreamError> {
        Ok(self.table()?.signatures())
    }

    /// Dump of every scope and its blocks, nearest scope first.
    pub fn description(&mut self) -> Result<String, CodeStreamError> {
        let table = self.table()?;
        let mut out = String::new();
        for (index, scope) in table.scopes().iter().enumerate() {
            out.push_str(&format!("// scope {}: {}\n", index, scope.file_path()));
            for (signature, entry) in scope.entries() {
                out.push_str(&render_template(signature.name(), &entry.parameters, &entry.body));
            }
        }
        Ok(out)
    }

    /// `#include` targets listed in the optional `includeFiles` block.
    pub fn header_files(&mut self) -> Result<BTreeSet<String>, CodeStreamError> {
        let code = self.get_code_block("includeFiles", &[], true)?;
        Ok(code
            .lines()
            .filter_map(|line| line.trim().strip_prefix("#include"))
            .map(|file| file.trim().to_string())
            .filter(|file| !file.is_empty())
            .collect())
    }

    fn origin_path(&self) -> String {
        match self.origins.first() {
            Some(TemplateOrigin::Text { path, .. }) => path.clone(),
            Some(TemplateOrigin::File { path, .. }) => path.display().to_string(),
            Some(TemplateOrigin::ClassChain { classes, .. }) => classes
                .first()
                .map(|class| class_template_path(&self.config, class).display().to_string())
                .unwrap_or_default(),
            None => String::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    pub fn append(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /// Insert `text` at byte `offset` of the output.
    pub fn insert(&mut self, offset: usize, text: &str) -> Result<(), CodeStreamError> {
        if offset > self.output.len() || !self.output.is_char_boundary(offset) {
            return Err(CodeStreamError::InsertOutOfBounds {
                offset,
                len: self.output.len(),
            });
        }
        self.output.insert_str(offset, text);
        Ok(())
    }

    /// Empty the output; the parsed table is kept.
    pub fn clear(&mut self) {
        self.output.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

impl fmt::Display for CodeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.output)
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

struct Resolver<'a> {
    table: &'a CodeBlockTable,
    origin: String,
}

impl Resolver<'_> {
    fn resolve(
        &self,
        start: usize,
        signature: &BlockSignature,
        arguments: Option<&[String]>,
        may_not_exist: bool,
        depth: usize,
    ) -> Result<String, CodeStreamError> {
        if depth > MAX_DEPTH {
            return Err(CodeStreamError::RecursionLimit(MAX_DEPTH));
        }

        let Some((scope, entry)) = self.table.lookup_from(start, signature) else {
            if may_not_exist {
                tracing::debug!(block = %signature, "optional code block not found");
                return Ok(String::new());
            }
            return Err(CodeStreamError::BlockNotFound {
                signature: signature.clone(),
                path: self.farthest_path(),
                original_path: self.origin.clone(),
            });
        };

        let Some(arguments) = arguments else {
            return Ok(entry.body.clone());
        };
        let body = substitute_parameters(&entry.body, &entry.parameters, arguments);
        self.substitute_super_and_this(&body, signature, scope, &entry.file_path, depth)
    }

    /// Replace every `$this(...)`, `$this.name(...)`, `$super(...)` and
    /// `$super.name(...)` in `body`, left to right.
    ///
    /// Call arguments are expanded first. `$this` searches from `scope`
    /// onward, `$super` from the scope after it.
    fn substitute_super_and_this(
        &self,
        body: &str,
        current: &BlockSignature,
        scope: usize,
        path: &str,
        depth: usize,
    ) -> Result<String, CodeStreamError> {
        let mut out = String::with_capacity(body.len());
        let mut cursor = 0;

        while let Some((start, kind, after)) = next_block_call(body, cursor) {
            out.push_str(&body[cursor..start]);

            let ill_formatted = || CodeStreamError::IllFormattedCall {
                kind,
                signature: current.clone(),
            };
            let open = after + body[after..].find('(').ok_or_else(ill_formatted)?;
            let name = match body[after..open].trim_start().strip_prefix('.') {
                Some(qualified) => qualified.trim(),
                None if body[after..open].trim().is_empty() => current.name(),
                None => return Err(ill_formatted()),
            };
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(ill_formatted());
            }
            let close = find_matching_close(body, open).ok_or_else(ill_formatted)?;

            let inner = self.substitute_super_and_this(&body[open + 1..close], current, scope, path, depth + 1)?;
            let wrapped = format!("({})", inner);
            let arguments = parse_parameter_list(&wrapped, 0, wrapped.len());
            let target = BlockSignature::new(name, arguments.len());

            let search_from = match kind {
                CallKind::This if target == *current => {
                    return Err(CodeStreamError::RecursiveAppend {
                        signature: target,
                        path: path.to_string(),
                    });
                }
                CallKind::This => scope,
                CallKind::Super => scope + 1,
            };
            if self.table.lookup_from(search_from, &target).is_none() {
                return Err(CodeStreamError::SuperThisNotFound {
                    kind,
                    signature: target,
                    path: path.to_string(),
                });
            }

            let code = self.resolve(search_from, &target, Some(&arguments), false, depth + 1)?;
            out.push_str(&code);
            cursor = close + 1;
        }

        out.push_str(&body[cursor..]);
        Ok(out)
    }

    fn farthest_path(&self) -> String {
        self.table
            .scopes()
            .last()
            .map(|scope| scope.file_path().to_string())
            .unwrap_or_else(|| self.origin.clone())
    }
}

/// Next `$this` or `$super` at or after `from`, as (start, kind, index after
/// the keyword). The keyword must be followed, after optional spaces, by `(`
/// or `.`.
fn next_block_call(body: &str, from: usize) -> Option<(usize, CallKind, usize)> {
    let mut search = from;
    while let Some(offset) = body.get(search..)?.find('$') {
        let start = search + offset;
        let rest = &body[start + 1..];
        for kind in [CallKind::This, CallKind::Super] {
            let keyword = kind.keyword();
            if let Some(after) = rest.strip_prefix(keyword)
                && after.trim_start_matches(' ').starts_with(['(', '.'])
            {
                return Some((start, kind, start + 1 + keyword.len()));
            }
        }
        search = start + 1;
    }
    None
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Indent every line of `text` by four spaces per level.
///
/// A trailing newline is not followed by indentation.
pub fn indent(level: usize, text: &str) -> String {
    if level == 0 || text.is_empty() {
        return text.to_string();
    }
    let pad = "    ".repeat(level);
    let mut out = String::with_capacity(text.len() + pad.len() * 4);
    for line in text.split_inclusive('\n') {
        out.push_str(&pad);
        out.push_str(line);
    }
    out
}

fn render_template(name: &str, parameters: &[String], body: &str) -> String {
    let header = if parameters.is_empty() {
        name.to_string()
    } else {
        let bare: Vec<&str> = parameters
            .iter()
            .map(|p| p.strip_prefix('$').unwrap_or(p))
            .collect();
        format!("{}({})", name, bare.join(", "))
    };
    format!("{} {} {}\n{}{}\n\n", BLOCK_START, header, HEADER_END, body, BLOCK_END)
}
