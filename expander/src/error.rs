use codestream::CodeStreamError;

use crate::model::ModelError;

/// Failure while expanding macros in generated code.
#[derive(Debug, thiserror::Error)]
pub enum ExpandError {
    #[error("Failed to find the close parenthesis of ${macro_name}( in \"{code}\".")]
    UnbalancedParen { macro_name: String, code: String },

    #[error("Failed to find '}}' in \"{code}\".")]
    UnterminatedBrace { code: String },

    #[error("Failed to find '{name}' variable in scope, code was \"{code}\".")]
    VariableNotFound { name: String, code: String },

    #[error("Unknown macro ${0}().")]
    UnknownMacro(String),

    #[error("\"{arguments}\" is not acceptable by ${macro_name}(). {usage}")]
    BadArguments {
        macro_name: &'static str,
        arguments: String,
        usage: &'static str,
    },

    #[error("Could not find port \"{0}\".")]
    PortNotFound(String),

    #[error("No attribute named: {0}")]
    AttributeNotFound(String),

    #[error("{0} is not a port or parameter.")]
    NotTyped(String),

    #[error("{0} does not contain an array.")]
    NotAnArray(String),

    #[error("$ref is no longer supported as a macro. To reference input/output ports, use $get() and $put(). For parameters, use $param()")]
    RefUnsupported,

    #[error("Bad syntax in ${macro_name}(): {message} Processed string was: {code}")]
    BadSyntax {
        macro_name: &'static str,
        message: &'static str,
        code: String,
    },

    #[error("Failed to invoke user macro (${name}): {message}")]
    UserMacro { name: String, message: String },

    #[error("Failed to replace the parameter \"{argument}\" in the macro \"{macro_name}\".\nInitial code was:\n{code}")]
    MacroFailed {
        macro_name: String,
        argument: String,
        code: String,
        #[source]
        source: Box<ExpandError>,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Block(#[from] CodeStreamError),

    #[error("macro expansion nested deeper than {0} levels")]
    RecursionLimit(usize),
}
