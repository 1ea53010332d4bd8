pub mod context;
pub mod error;
pub mod handlers;
pub mod model;
pub mod names;
pub mod parser;
pub mod types;

pub use context::{AdapterMacro, GenerationContext, MacroRegistry, UserMacro};
pub use error::ExpandError;
pub use model::{ChannelRef, Component, Direction, ModelComponent, ModelError, Parameter, Port};
pub use parser::TemplateParser;
pub use types::{DataType, Target, TypeSystem};
