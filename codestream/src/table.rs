use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use crate::error::CodeStreamError;
use crate::signature::BlockSignature;

/// One parsed code block.
#[derive(Debug, Clone)]
pub struct CodeBlockEntry {
    /// File the block was declared in, for diagnostics.
    pub file_path: String,
    /// Parameter names, each starting with `$`.
    pub parameters: Vec<String>,
    /// Trimmed body text with parameters unsubstituted.
    pub body: String,
    /// Byte range of the whole block (header through end marker).
    pub span: Range<usize>,
    pub file_id: usize,
}

/// The blocks declared by one template file, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    file_path: String,
    order: Vec<BlockSignature>,
    blocks: HashMap<BlockSignature, CodeBlockEntry>,
}

impl Scope {
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn get(&self, signature: &BlockSignature) -> Option<&CodeBlockEntry> {
        self.blocks.get(signature)
    }

    pub fn contains(&self, signature: &BlockSignature) -> bool {
        self.blocks.contains_key(signature)
    }

    /// Blocks in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (&BlockSignature, &CodeBlockEntry)> {
        self.order
            .iter()
            .filter_map(|sig| self.blocks.get(sig).map(|entry| (sig, entry)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Ordered chain of scopes, most derived first.
///
/// Lookups walk the chain from a starting scope and the first scope holding
/// the signature wins, which gives derived templates override semantics.
#[derive(Debug, Clone, Default)]
pub struct CodeBlockTable {
    scopes: Vec<Scope>,
}

impl CodeBlockTable {
    pub fn new() -> Self {
        CodeBlockTable::default()
    }

    /// Append a new scope farther down the chain and return its index.
    pub fn add_scope(&mut self, file_path: impl Into<String>) -> usize {
        self.scopes.push(Scope {
            file_path: file_path.into(),
            ..Scope::default()
        });
        self.scopes.len() - 1
    }

    /// Register `signature` in `scope` with an empty body.
    pub fn put_parameters(
        &mut self,
        scope: usize,
        signature: BlockSignature,
        parameters: Vec<String>,
    ) -> Result<(), CodeStreamError> {
        let scope = &mut self.scopes[scope];
        if scope.blocks.contains_key(&signature) {
            return Err(CodeStreamError::DuplicateSignature {
                signature,
                path: scope.file_path.clone(),
            });
        }
        scope.order.push(signature.clone());
        scope.blocks.insert(
            signature,
            CodeBlockEntry {
                file_path: scope.file_path.clone(),
                parameters,
                body: String::new(),
                span: 0..0,
                file_id: 0,
            },
        );
        Ok(())
    }

    /// Fill in the body of a signature registered with [`put_parameters`].
    ///
    /// [`put_parameters`]: CodeBlockTable::put_parameters
    pub fn put_code(
        &mut self,
        scope: usize,
        signature: &BlockSignature,
        body: String,
        span: Range<usize>,
        file_id: usize,
    ) -> Result<(), CodeStreamError> {
        let scope = &mut self.scopes[scope];
        let path = scope.file_path.clone();
        let entry =
            scope
                .blocks
                .get_mut(signature)
                .ok_or_else(|| CodeStreamError::BlockNotFound {
                    signature: signature.clone(),
                    path: path.clone(),
                    original_path: path,
                })?;
        entry.body = body;
        entry.span = span;
        entry.file_id = file_id;
        Ok(())
    }

    /// Chain lookup over every scope.
    pub fn lookup(&self, signature: &BlockSignature) -> Option<(usize, &CodeBlockEntry)> {
        self.lookup_from(0, signature)
    }

    /// Chain lookup starting at scope `start`; nearer scopes are skipped.
    pub fn lookup_from(
        &self,
        start: usize,
        signature: &BlockSignature,
    ) -> Option<(usize, &CodeBlockEntry)> {
        self.scopes
            .iter()
            .enumerate()
            .skip(start)
            .find_map(|(index, scope)| scope.get(signature).map(|entry| (index, entry)))
    }

    /// Every signature declared in any scope.
    pub fn signatures(&self) -> BTreeSet<BlockSignature> {
        self.scopes
            .iter()
            .flat_map(|scope| scope.order.iter().cloned())
            .collect()
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn scope(&self, index: usize) -> Option<&Scope> {
        self.scopes.get(index)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn clear(&mut self) {
        self.scopes.clear();
    }
}
