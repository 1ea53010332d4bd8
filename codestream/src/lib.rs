//! Code block templates: parsing `/*** name($a) ***/ ... /**/` blocks out of
//! template files into a chain of scopes, and resolving blocks with
//! parameter substitution and `$this`/`$super` calls into an output buffer.

pub mod config;
pub mod error;
pub mod parser;
pub mod scan;
pub mod signature;
pub mod source;
pub mod stream;
pub mod table;

pub use config::{LineDirective, StreamConfig};
pub use error::{CallKind, CodeStreamError};
pub use parser::ParseError;
pub use signature::BlockSignature;
pub use stream::{CodeStream, DEFAULT_BLOCKS, indent};
pub use table::{CodeBlockEntry, CodeBlockTable, Scope};
