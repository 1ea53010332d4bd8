//! The built-in macros.

use codestream::scan::parse_list;

use crate::error::ExpandError;
use crate::model::{ChannelRef, Parameter, Port};
use crate::names::{escape_port_name, generate_name, parse_port_channel, unescape_port_name};
use crate::parser::TemplateParser;
use crate::types::DataType;

const GET_USAGE: &str = "The macro accepts: (input#channel, offset), (input, offset), (input#channel) or (input).";
const PUT_USAGE: &str = "The macro accepts: (output#channel, token), (output, token), (output#channel, offset, token) or (output, offset, token).";
const PARAM_USAGE: &str = "The macro accepts: (name) or (name, offset).";
const FIRE_AT_USAGE: &str = "The macro accepts: (actor, timestamp, microstep).";

impl TemplateParser<'_> {
    // -----------------------------------------------------------------------
    // Ports
    // -----------------------------------------------------------------------

    /// The port named `name`, also trying the unescaped form.
    pub fn find_port(&self, name: &str) -> Option<&Port> {
        let component = self.component;
        component
            .port(name)
            .or_else(|| component.port(&unescape_port_name(name)))
    }

    /// Port and channel of a `port` or `port#channel` reference.
    fn port_channel<'r>(
        &self,
        reference: &'r str,
        macro_name: &'static str,
        usage: &'static str,
    ) -> Result<(&Port, &'r str), ExpandError> {
        let bad = || ExpandError::BadArguments {
            macro_name,
            arguments: reference.to_string(),
            usage,
        };
        let (name, channel) = parse_port_channel(reference).ok_or_else(bad)?;
        if channel.is_empty() {
            return Err(bad());
        }
        let port = self
            .find_port(name)
            .ok_or_else(|| ExpandError::PortNotFound(name.to_string()))?;
        Ok((port, channel))
    }

    pub(crate) fn replace_get(&mut self, argument: &str, with_payload: bool) -> Result<String, ExpandError> {
        let macro_name = if with_payload { "get" } else { "getNoPayload" };
        let arguments = parse_list(argument);
        let (reference, offset) = match arguments.as_slice() {
            [reference] => (reference.as_str(), "0"),
            [reference, offset] => (reference.as_str(), offset.as_str()),
            _ => {
                return Err(ExpandError::BadArguments {
                    macro_name,
                    arguments: argument.to_string(),
                    usage: GET_USAGE,
                });
            }
        };
        let (port, channel) = self.port_channel(reference, macro_name, GET_USAGE)?;
        let code = self
            .component
            .generate_get_code(port, channel, offset, with_payload)?;
        self.process_code(&code)
    }

    pub(crate) fn replace_has_token(&mut self, argument: &str) -> Result<String, ExpandError> {
        let arguments = parse_list(argument);
        let (reference, offset) = match arguments.as_slice() {
            [reference] => (reference.as_str(), "0"),
            [reference, offset] => (reference.as_str(), offset.as_str()),
            _ => {
                return Err(ExpandError::BadArguments {
                    macro_name: "hasToken",
                    arguments: argument.to_string(),
                    usage: GET_USAGE,
                });
            }
        };
        let (port, channel) = self.port_channel(reference, "hasToken", GET_USAGE)?;
        let code = self
            .component
            .generate_has_token_code(port, channel, offset)?;
        self.process_code(&code)
    }

    pub(crate) fn replace_put(&mut self, argument: &str, local_inside: bool) -> Result<String, ExpandError> {
        let macro_name = if local_inside { "putLocalInside" } else { "put" };
        let arguments = parse_list(argument);
        let (reference, offset, value) = match arguments.as_slice() {
            [reference, value] => (reference.as_str(), "0", value.as_str()),
            [reference, offset, value] => (reference.as_str(), offset.as_str(), value.as_str()),
            _ => {
                return Err(ExpandError::BadArguments {
                    macro_name,
                    arguments: argument.to_string(),
                    usage: PUT_USAGE,
                });
            }
        };
        let (port, channel) = self.port_channel(reference, macro_name, PUT_USAGE)?;
        let code = self
            .component
            .generate_put_code(port, channel, offset, value, local_inside)?;
        self.process_code(&code)
    }

    // -----------------------------------------------------------------------
    // Parameters
    // -----------------------------------------------------------------------

    pub(crate) fn replace_param(&mut self, argument: &str) -> Result<String, ExpandError> {
        let arguments = parse_list(argument);
        let (name, offset) = match arguments.as_slice() {
            [name] => (name.as_str(), None),
            [name, offset] => (name.as_str(), Some(offset.as_str())),
            _ => {
                return Err(ExpandError::BadArguments {
                    macro_name: "param",
                    arguments: argument.to_string(),
                    usage: PARAM_USAGE,
                });
            }
        };
        let component = self.component;
        let parameter = component
            .parameter(name)
            .ok_or_else(|| ExpandError::AttributeNotFound(name.to_string()))?;
        match component.parameter_reference(parameter, offset)? {
            Some(reference) => Ok(reference),
            None => self.parameter_value(argument),
        }
    }

    /// Value of a parameter as target code: `name`, `name, offset` or
    /// `(CastType)name`, optionally with an offset.
    pub fn parameter_value(&mut self, argument: &str) -> Result<String, ExpandError> {
        let argument = if argument.contains('$') {
            self.process_code(argument)?
        } else {
            argument.to_string()
        };

        let mut parts = argument.split(',').map(str::trim);
        let mut attribute = parts.next().unwrap_or_default();
        let offset = parts.next();
        if parts.next().is_some() {
            return Err(ExpandError::BadArguments {
                macro_name: "val",
                arguments: argument.clone(),
                usage: PARAM_USAGE,
            });
        }

        let mut cast = None;
        let pieces: Vec<&str> = attribute
            .split(['(', ')'])
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .collect();
        match pieces.as_slice() {
            [name] => attribute = *name,
            [cast_type, name] => {
                cast = Some(*cast_type);
                attribute = *name;
            }
            _ => {
                return Err(ExpandError::BadArguments {
                    macro_name: "val",
                    arguments: argument.clone(),
                    usage: "Invalid cast type.",
                });
            }
        }

        let component = self.component;
        let parameter = component
            .scoped_variable(attribute)
            .ok_or_else(|| ExpandError::AttributeNotFound(attribute.to_string()))?;

        match offset {
            None if parameter.string_mode => {
                let quoted = format!("\"{}\"", escape_string(&parameter.expression));
                self.generate_type_convert_method(&quoted, cast, "String")
            }
            None => {
                let code = self.process_code(&parameter.expression)?;
                let ref_type = self.types.code_gen_type(&parameter.data_type);
                self.generate_type_convert_method(&code, cast, &ref_type)
            }
            Some(offset) => {
                let element = array_element(parameter, offset)?;
                let code = self.process_code(&element)?;
                let element_type = match &parameter.data_type {
                    DataType::Array(element, _) => self.types.code_gen_type(element),
                    other => self.types.code_gen_type(other),
                };
                self.generate_type_convert_method(&code, cast, &element_type)
            }
        }
    }

    /// `expression` converted from `ref_type` to `cast`, when they differ.
    pub fn generate_type_convert_method(
        &mut self,
        expression: &str,
        cast: Option<&str>,
        ref_type: &str,
    ) -> Result<String, ExpandError> {
        match cast {
            Some(cast) if cast != ref_type => {
                self.process_code(&format!("$convert_{}_{}({})", ref_type, cast, expression))
            }
            _ if expression == "object(null)" => Ok("null".to_string()),
            _ => Ok(expression.to_string()),
        }
    }

    /// `$convert_From_To(expression)`.
    pub(crate) fn replace_convert(&mut self, types: &str, expression: &str) -> Result<String, ExpandError> {
        let Some((from, to)) = types.split_once('_') else {
            return Err(ExpandError::BadSyntax {
                macro_name: "convert",
                message: "Expected $convert_From_To(expression).",
                code: types.to_string(),
            });
        };
        if from == to {
            return Ok(expression.to_string());
        }
        let function = format!("{}to{}", from, to);
        self.context.functions_used.insert(function.clone());
        Ok(format!("{}({})", function, expression))
    }

    pub(crate) fn size(&mut self, name: &str) -> Result<String, ExpandError> {
        let component = self.component;
        if let Some(parameter) = component.scoped_variable(name) {
            if let Some(elements) = parameter.array_elements() {
                return Ok(elements.len().to_string());
            }
            if let DataType::Array(_, Some(length)) = &parameter.data_type {
                return Ok(length.to_string());
            }
            return Ok("1".to_string());
        }

        let port = self
            .find_port(name)
            .ok_or_else(|| ExpandError::AttributeNotFound(name.to_string()))?;
        if port.multiport {
            return Ok(port.width.to_string());
        }
        match &port.data_type {
            DataType::Array(_, Some(length)) => Ok(length.to_string()),
            DataType::Array(_, None) => {
                let reference = component.port_reference(port, "0", "0", false)?;
                Ok(format!(
                    "{}.payload.{}->size",
                    reference,
                    self.types.code_gen_type(&port.data_type)
                ))
            }
            _ => Ok("1".to_string()),
        }
    }

    // -----------------------------------------------------------------------
    // Types
    // -----------------------------------------------------------------------

    fn data_type_of(&self, name: &str) -> Option<(DataType, bool)> {
        if let Some(port) = self.find_port(name) {
            return Some((port.data_type.clone(), true));
        }
        self.component
            .parameter(name)
            .map(|parameter| (parameter.data_type.clone(), false))
    }

    pub(crate) fn replace_target_type(&mut self, name: &str) -> Result<String, ExpandError> {
        let (ty, _) = self
            .data_type_of(name)
            .ok_or_else(|| ExpandError::NotTyped(name.to_string()))?;
        Ok(self.types.target_type(&ty))
    }

    pub(crate) fn replace_type(&mut self, name: &str, prefix: &str) -> Result<String, ExpandError> {
        let (ty, is_port) = self
            .data_type_of(name)
            .ok_or_else(|| ExpandError::NotTyped(name.to_string()))?;
        let code_gen_type = self.types.code_gen_type(&ty);
        if is_port && code_gen_type.contains(',') {
            return Ok("Record".to_string());
        }
        Ok(format!("{}{}", prefix, code_gen_type))
    }

    // -----------------------------------------------------------------------
    // Names
    // -----------------------------------------------------------------------

    /// Variable name of the component, optionally suffixed.
    pub fn actor_symbol(&self, suffix: &str) -> String {
        let name = generate_name(&self.component.full_name());
        if suffix.trim().is_empty() {
            name
        } else {
            format!("{}_{}", name, suffix)
        }
    }

    pub(crate) fn container_symbol(&self, suffix: &str) -> Result<String, ExpandError> {
        let container = self
            .component
            .container_full_name()
            .ok_or_else(|| ExpandError::AttributeNotFound(format!("container of {}", self.component.name())))?;
        let name = generate_name(&container);
        if suffix.trim().is_empty() {
            Ok(name)
        } else {
            Ok(format!("{}_{}", name, suffix))
        }
    }

    // -----------------------------------------------------------------------
    // Runtime support functions
    // -----------------------------------------------------------------------

    /// `$new(Type(args))` becomes `Type_new(args)`.
    pub fn new_invocation(&mut self, constructor: &str) -> Result<String, ExpandError> {
        let constructor = self.process_code(constructor)?;
        let open = constructor.find('(');
        let (Some(open), true) = (open, constructor.ends_with(')')) else {
            return Err(ExpandError::BadSyntax {
                macro_name: "new",
                message: "Expected $new(Type(arg1, arg2, ...)).",
                code: constructor,
            });
        };
        let type_name = constructor[..open].trim();
        self.context.new_types_used.insert(type_name.to_string());
        self.process_code(&format!("${}_new{}", type_name, &constructor[open..]))
    }

    /// `$tokenFunc(token::f(args))` and `$typeFunc(TYPE_T::f(args))`.
    ///
    /// Both dispatch through the function table; a token call passes the
    /// token as the first argument.
    pub fn function_invocation(&mut self, function: &str, is_static: bool) -> Result<String, ExpandError> {
        let macro_name = if is_static { "typeFunc" } else { "tokenFunc" };
        let function = self.process_code(function)?;
        let syntax = |message: &'static str| ExpandError::BadSyntax {
            macro_name,
            message,
            code: function.clone(),
        };

        let separator = function
            .find("::")
            .ok_or_else(|| syntax("The string \"::\" was not found."))?;
        let open = function[separator..]
            .find('(')
            .map(|i| separator + i)
            .ok_or_else(|| syntax("No \"(\" found after \"::\"."))?;
        if !function.ends_with(')') {
            return Err(syntax("The last \")\" was not the last character."));
        }

        let receiver = function[..separator].trim();
        let name = function[separator + 2..open].trim();
        self.context.functions_used.insert(name.to_string());

        if let Some((_, type_name)) = receiver.split_once('_')
            && (self.types.is_primitive(type_name) || matches!(type_name, "Complex" | "Matrix" | "Object"))
        {
            self.context.new_types_used.insert(type_name.to_string());
        }

        let arguments = function[open + 1..].trim();
        if is_static {
            Ok(format!("functionTable[(int){}][FUNC_{}]({}", receiver, name, arguments))
        } else {
            self.context.token_functions_used.insert(name.to_string());
            let arguments = if arguments.len() > 1 {
                format!(", {}", arguments)
            } else {
                arguments.to_string()
            };
            Ok(format!(
                "functionTable[(int){}.type][FUNC_{}]({}{}",
                receiver, name, receiver, arguments
            ))
        }
    }

    pub(crate) fn replace_fire_at(&mut self, argument: &str) -> Result<String, ExpandError> {
        if parse_list(argument).len() != 3 {
            return Err(ExpandError::BadArguments {
                macro_name: "fireAt",
                arguments: argument.to_string(),
                usage: FIRE_AT_USAGE,
            });
        }
        Ok(format!(
            "struct Director* director = (*(actor->getDirector))(actor);(*(director->fireAt))(director, (struct Actor*){});",
            argument
        ))
    }

    // -----------------------------------------------------------------------
    // Type conversion between connected ports
    // -----------------------------------------------------------------------

    /// Assignment of the source channel's data to the sink channel at
    /// `offset`, converting between their types.
    ///
    /// `alternative_source` replaces the source reference when given. The
    /// result may contain `$new` and `$typeFunc` macros and is not expanded.
    pub fn generate_type_convert_statement(
        &mut self,
        source: ChannelRef<'_>,
        sink: ChannelRef<'_>,
        offset: &str,
        alternative_source: Option<&str>,
    ) -> Result<String, ExpandError> {
        let source_type = &source.port.data_type;
        let sink_type = &sink.port.data_type;
        if *source_type == DataType::Unknown {
            return Ok(String::new());
        }

        let source_ref = match alternative_source {
            Some(reference) => reference.to_string(),
            None => source.component.port_reference(
                source.port,
                &source.channel.to_string(),
                offset,
                false,
            )?,
        };
        let sink_ref = sink.component.port_reference(
            sink.port,
            &sink.channel.to_string(),
            offset,
            true,
        )?;

        let types = self.types;
        let mut result = source_ref;
        if sink_type != source_type {
            let source_cg = types.code_gen_type(source_type);
            let sink_cg = types.code_gen_type(sink_type);

            if types.is_primitive_type(sink_type) {
                result = format!("{}to{}({})", source_cg, sink_cg, result);
            } else if types.is_primitive_type(source_type) {
                result = format!("$new({}({}))", source_cg, result);
            }

            let sink_is_boxed =
                !matches!(sink_type, DataType::Scalar | DataType::General) && !types.is_primitive_type(sink_type);
            if sink_is_boxed {
                if let DataType::Array(element, _) = sink_type {
                    if types.is_primitive_type(source_type) {
                        result = format!("$new({}(1, 1, {}, TYPE_{}))", sink_cg, result, source_cg);
                    }
                    if !matches!(sink_type.innermost_element(), DataType::Scalar | DataType::General) {
                        result = format!(
                            "$typeFunc(TYPE_{}::convert({}, /*CGH*/ TYPE_{}))",
                            sink_cg,
                            result,
                            types.code_gen_type(element)
                        );
                    }
                } else {
                    result = format!("$typeFunc(TYPE_{}::convert({}))", sink_cg, result);
                }
            }
        }

        tracing::debug!(
            source = %escape_port_name(&source.port.name),
            sink = %escape_port_name(&sink.port.name),
            "generated type conversion"
        );
        Ok(format!("{} = {};\n", sink_ref, result))
    }
}

fn array_element(parameter: &Parameter, offset: &str) -> Result<String, ExpandError> {
    let elements = parameter
        .array_elements()
        .ok_or_else(|| ExpandError::NotAnArray(parameter.name.clone()))?;
    let index: usize = offset
        .trim()
        .parse()
        .map_err(|_| ExpandError::BadArguments {
            macro_name: "val",
            arguments: format!("{}, {}", parameter.name, offset),
            usage: "A constant array parameter needs a numeric offset.",
        })?;
    elements
        .get(index)
        .cloned()
        .ok_or_else(|| ExpandError::NotAnArray(format!("{}[{}]", parameter.name, index)))
}

/// Escape `text` for a double-quoted string literal.
fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}
