use codestream::CodeStream;
use codestream::scan::{find_matching_close, parse_list};

use crate::context::GenerationContext;
use crate::error::ExpandError;
use crate::model::Component;
use crate::types::TypeSystem;

const MAX_DEPTH: usize = 256;

/// Expands `$macro(args)` and `${name}` forms in generated code for one
/// component.
pub struct TemplateParser<'a> {
    pub(crate) component: &'a dyn Component,
    pub(crate) types: &'a dyn TypeSystem,
    pub(crate) context: &'a mut GenerationContext,
    depth: usize,
}

/// What the text at a `$` introduces.
enum MacroForm<'t> {
    /// `$$`: copied through untouched.
    Doubled,
    /// `${name}`
    Variable,
    /// `$name(`, with the index of the `(`.
    Call { name: &'t str, open: usize },
    /// Anything else; the `$` is literal.
    Literal,
}

impl<'a> TemplateParser<'a> {
    pub fn new(component: &'a dyn Component, types: &'a dyn TypeSystem, context: &'a mut GenerationContext) -> Self {
        TemplateParser {
            component,
            types,
            context,
            depth: 0,
        }
    }

    pub fn component(&self) -> &dyn Component {
        self.component
    }

    pub fn context(&self) -> &GenerationContext {
        &*self.context
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Expand every macro in `code`, left to right.
    ///
    /// Macro arguments are expanded before the macro itself. A `$` escaped
    /// as `\$` is left alone, as is `$$` and any `$` that does not start a
    /// macro.
    pub fn process_code(&mut self, code: &str) -> Result<String, ExpandError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExpandError::RecursionLimit(MAX_DEPTH));
        }
        self.depth += 1;
        let result = self.expand(code);
        self.depth -= 1;
        result
    }

    /// Resolve block `name` from `stream` and expand its macros.
    ///
    /// The stream's output is replaced by the resolved block.
    pub fn generate_block_code(
        &mut self,
        stream: &mut CodeStream,
        name: &str,
        arguments: &[String],
    ) -> Result<String, ExpandError> {
        stream.clear();
        let code = stream.get_code_block(name, arguments, false)?;
        stream.append(&code);
        self.process_code(stream.output())
    }

    // -----------------------------------------------------------------------
    // Scanner
    // -----------------------------------------------------------------------

    fn expand(&mut self, code: &str) -> Result<String, ExpandError> {
        let Some(first) = macro_start(code, 0) else {
            return Ok(code.to_string());
        };

        let mut result = String::with_capacity(code.len());
        result.push_str(&code[..first]);
        let mut position = first;

        while position < code.len() {
            let end = match classify(code, position) {
                MacroForm::Doubled => {
                    let next = macro_start(code, position + 2).unwrap_or(code.len());
                    result.push_str(&code[position..next]);
                    position = next;
                    continue;
                }
                MacroForm::Variable => {
                    let Some(close) = code[position..].find('}').map(|i| position + i) else {
                        return Err(ExpandError::UnterminatedBrace {
                            code: code.to_string(),
                        });
                    };
                    let name = code[position + 2..close].trim();
                    result.push_str(&self.lookup_variable(name, code)?);
                    close + 1
                }
                MacroForm::Call { name, open } => {
                    let Some(close) = find_matching_close(code, open) else {
                        return Err(ExpandError::UnbalancedParen {
                            macro_name: name.to_string(),
                            code: code.to_string(),
                        });
                    };
                    let argument = self.process_code(code[open + 1..close].trim())?;
                    tracing::trace!(macro_name = name, argument = %argument, "expanding macro");
                    let replacement =
                        self.replace_macro(name, &argument)
                            .map_err(|e| ExpandError::MacroFailed {
                                macro_name: name.to_string(),
                                argument: argument.clone(),
                                code: code.to_string(),
                                source: Box::new(e),
                            })?;
                    result.push_str(&replacement);
                    close + 1
                }
                MacroForm::Literal => {
                    result.push('$');
                    position + 1
                }
            };

            let next = macro_start(code, end).unwrap_or(code.len());
            result.push_str(&code[end..next]);
            position = next;
        }

        Ok(result)
    }

    fn lookup_variable(&self, name: &str, code: &str) -> Result<String, ExpandError> {
        if let Some(variable) = self.component.scoped_variable(name) {
            return Ok(variable.expression.clone());
        }
        if let Some(constant) = self.context.constants.get(name) {
            return Ok(constant.clone());
        }
        Err(ExpandError::VariableNotFound {
            name: name.to_string(),
            code: code.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Text for macro `name` applied to the already expanded `argument`.
    pub(crate) fn replace_macro(&mut self, name: &str, argument: &str) -> Result<String, ExpandError> {
        // `$abc$def(x)`: `$abc` stays literal, `$def(x)` is expanded.
        if let Some(dollar) = name.find('$') {
            let inner = self.replace_macro(&name[dollar + 1..], argument)?;
            return Ok(format!("${}{}", &name[..dollar], inner));
        }

        match name {
            "get" => self.replace_get(argument, true),
            "getNoPayload" => self.replace_get(argument, false),
            "put" => self.replace_put(argument, false),
            "putLocalInside" => self.replace_put(argument, true),
            "hasToken" => self.replace_has_token(argument),
            "ref" => Err(ExpandError::RefUnsupported),
            "param" => self.replace_param(argument),
            "targetType" => self.replace_target_type(argument),
            "type" => self.replace_type(argument, "TYPE_"),
            "cgType" => self.replace_type(argument, ""),
            "val" => self.parameter_value(argument),
            "size" => self.size(argument),
            "actorSymbol" => Ok(self.actor_symbol(argument)),
            "containerSymbol" => self.container_symbol(argument),
            "actorName" => Ok(self.component.name().to_string()),
            "actorClass" => Ok(format!("{}_{}", self.component.class_name().replace('.', "_"), argument)),
            "new" => self.new_invocation(argument),
            "tokenFunc" => self.function_invocation(argument, false),
            "typeFunc" => self.function_invocation(argument, true),
            "fireAt" => self.replace_fire_at(argument),
            "structure" => {
                self.context
                    .new_types_used
                    .insert(format!("{}Structure", argument));
                Ok(String::new())
            }
            other => {
                if let Some(types) = other.strip_prefix("convert_") {
                    return self.replace_convert(types, argument);
                }
                if let Some(type_name) = other.strip_suffix("_new")
                    && !type_name.is_empty()
                {
                    self.context.new_types_used.insert(type_name.to_string());
                    return Ok(format!("{}_new({})", type_name, argument));
                }
                self.replace_registered(other, argument)
            }
        }
    }

    fn replace_registered(&mut self, name: &str, argument: &str) -> Result<String, ExpandError> {
        if let Some(handler) = self.context.macros.adapter(name) {
            tracing::debug!(macro_name = name, "expanding adapter macro");
            return Ok((*handler)(self.component));
        }
        if let Some(handler) = self.context.macros.user(name) {
            tracing::debug!(macro_name = name, "expanding user macro");
            let arguments = parse_list(argument);
            let user_error = |message| ExpandError::UserMacro {
                name: name.to_string(),
                message,
            };
            handler.check_arguments(&arguments).map_err(user_error)?;
            return handler.handle_macro(&arguments).map_err(user_error);
        }
        Err(ExpandError::UnknownMacro(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Scanning helpers
// ---------------------------------------------------------------------------

/// Next `$` at or after `from` that is not escaped as `\$`.
fn macro_start(code: &str, from: usize) -> Option<usize> {
    let bytes = code.as_bytes();
    let mut search = from;
    loop {
        let position = search + code.get(search..)?.find('$')?;
        if position > 0 && bytes[position - 1] == b'\\' {
            search = position + 1;
            continue;
        }
        return Some(position);
    }
}

fn is_macro_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn classify(code: &str, position: usize) -> MacroForm<'_> {
    let rest = &code[position + 1..];
    if rest.starts_with('$') {
        return MacroForm::Doubled;
    }
    if rest.starts_with('{') {
        return MacroForm::Variable;
    }

    let name_len = rest.find(|c| !is_macro_name_char(c)).unwrap_or(rest.len());
    if name_len == 0 {
        return MacroForm::Literal;
    }
    let after_name = &rest[name_len..];
    let gap = after_name.len() - after_name.trim_start_matches([' ', '\t']).len();
    if after_name[gap..].starts_with('(') {
        MacroForm::Call {
            name: &rest[..name_len],
            open: position + 1 + name_len + gap,
        }
    } else {
        MacroForm::Literal
    }
}
