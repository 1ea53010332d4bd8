//! The slice of the actor model that macro expansion consults.

use serde::Deserialize;

use crate::names::{escape_port_name, generate_name};
use crate::types::DataType;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ModelError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Port {
    pub name: String,
    pub direction: Direction,
    #[serde(rename = "type", default = "unknown_type")]
    pub data_type: DataType,
    #[serde(default)]
    pub multiport: bool,
    /// Number of connected channels.
    #[serde(default = "default_width")]
    pub width: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type", default = "unknown_type")]
    pub data_type: DataType,
    /// Value as an expression in the target language. Arrays are written
    /// `{a, b, c}`.
    #[serde(default)]
    pub expression: String,
    /// The expression is literal text rather than code.
    #[serde(default)]
    pub string_mode: bool,
    /// The value may change while the model runs, so generated code must
    /// read it from a variable.
    #[serde(default)]
    pub modifiable: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, data_type: DataType, expression: impl Into<String>) -> Self {
        Parameter {
            name: name.into(),
            data_type,
            expression: expression.into(),
            string_mode: false,
            modifiable: false,
        }
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Parameter {
            string_mode: true,
            ..Parameter::new(name, DataType::String, value)
        }
    }

    pub fn modifiable(mut self) -> Self {
        self.modifiable = true;
        self
    }

    /// Items of an `{a, b, c}` array expression.
    pub fn array_elements(&self) -> Option<Vec<String>> {
        let inner = self
            .expression
            .trim()
            .strip_prefix('{')?
            .strip_suffix('}')?;
        Some(codestream::scan::parse_list(inner))
    }
}

fn unknown_type() -> DataType {
    DataType::Unknown
}

fn default_width() -> usize {
    1
}

/// A port channel at the end of a connection, for type conversion.
#[derive(Clone, Copy)]
pub struct ChannelRef<'a> {
    pub component: &'a dyn Component,
    pub port: &'a Port,
    pub channel: usize,
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// The model object whose templates are being expanded.
///
/// Name and lookup queries have no side effects. The `generate_*` methods
/// return code that may itself contain macros; callers expand it.
pub trait Component {
    fn name(&self) -> &str;

    /// Dotted path from the top level, e.g. `.model.Ramp`.
    fn full_name(&self) -> String;

    /// Fully-qualified class, e.g. `ptolemy.actor.lib.Ramp`.
    fn class_name(&self) -> &str;

    fn container_full_name(&self) -> Option<String>;

    fn port(&self, name: &str) -> Option<&Port>;

    /// A parameter declared on this component.
    fn parameter(&self, name: &str) -> Option<&Parameter>;

    /// A variable visible from this component: its own parameters, then
    /// those of enclosing containers.
    fn scoped_variable(&self, name: &str) -> Option<&Parameter>;

    fn generate_get_code(&self, port: &Port, channel: &str, offset: &str, with_payload: bool) -> Result<String, ModelError>;

    fn generate_has_token_code(&self, port: &Port, channel: &str, offset: &str) -> Result<String, ModelError>;

    /// An assignment to the port; the template supplies the closing `;`.
    fn generate_put_code(
        &self,
        port: &Port,
        channel: &str,
        offset: &str,
        value: &str,
        local_inside: bool,
    ) -> Result<String, ModelError>;

    /// Reference to a modifiable parameter, or `None` when its value can be
    /// inlined.
    fn parameter_reference(&self, parameter: &Parameter, offset: Option<&str>) -> Result<Option<String>, ModelError>;

    /// Variable holding the data of one port channel.
    fn port_reference(&self, port: &Port, channel: &str, offset: &str, is_write: bool) -> Result<String, ModelError>;
}

// ---------------------------------------------------------------------------
// ModelComponent
// ---------------------------------------------------------------------------

/// A component described by data, with code generated in a plain
/// variables-per-port style.
///
/// Port `p` of component `.m.A` lives in `_m_A_p`, indexed by channel for
/// multiports and by offset when the offset is not `0`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelComponent {
    pub name: String,
    #[serde(default, rename = "class")]
    pub class_name: String,
    /// Full name of the enclosing composite, e.g. `.model`.
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Parameters of enclosing containers.
    #[serde(default)]
    pub scope: Vec<Parameter>,
}

impl ModelComponent {
    pub fn new(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        ModelComponent {
            name: name.into(),
            class_name: class_name.into(),
            ..ModelComponent::default()
        }
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn with_port(mut self, name: &str, direction: Direction, data_type: DataType) -> Self {
        self.ports.push(Port {
            name: name.to_string(),
            direction,
            data_type,
            multiport: false,
            width: 1,
        });
        self
    }

    pub fn with_multiport(mut self, name: &str, direction: Direction, data_type: DataType, width: usize) -> Self {
        self.ports.push(Port {
            name: name.to_string(),
            direction,
            data_type,
            multiport: true,
            width,
        });
        self
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_scoped(mut self, parameter: Parameter) -> Self {
        self.scope.push(parameter);
        self
    }

    fn variable_prefix(&self) -> String {
        generate_name(&self.full_name())
    }

    fn reference(&self, port: &Port, channel: &str, offset: &str) -> String {
        let mut reference = format!("{}_{}", self.variable_prefix(), escape_port_name(&port.name));
        if port.multiport {
            reference.push_str(&format!("[{}]", channel));
        }
        if offset != "0" {
            reference.push_str(&format!("[{}]", offset));
        }
        reference
    }
}

impl Component for ModelComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_name(&self) -> String {
        match &self.container {
            Some(container) => format!("{}.{}", container, self.name),
            None => format!(".{}", self.name),
        }
    }

    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn container_full_name(&self) -> Option<String> {
        self.container.clone()
    }

    fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    fn scoped_variable(&self, name: &str) -> Option<&Parameter> {
        self.parameter(name)
            .or_else(|| self.scope.iter().find(|p| p.name == name))
    }

    fn generate_get_code(&self, port: &Port, channel: &str, offset: &str, with_payload: bool) -> Result<String, ModelError> {
        if port.direction != Direction::Input {
            return Err(ModelError(format!("Cannot read from output port \"{}\".", port.name)));
        }
        let reference = self.reference(port, channel, offset);
        // Boxed tokens carry their value in a typed payload.
        match &port.data_type {
            DataType::Array(..) | DataType::Matrix | DataType::Complex | DataType::Record(_) if with_payload => {
                Ok(format!("{}.payload.$cgType({})", reference, escape_port_name(&port.name)))
            }
            _ => Ok(reference),
        }
    }

    fn generate_has_token_code(&self, port: &Port, channel: &str, _offset: &str) -> Result<String, ModelError> {
        let mut flag = format!("{}_{}_isPresent", self.variable_prefix(), escape_port_name(&port.name));
        if port.multiport {
            flag.push_str(&format!("[{}]", channel));
        }
        Ok(flag)
    }

    fn generate_put_code(
        &self,
        port: &Port,
        channel: &str,
        offset: &str,
        value: &str,
        local_inside: bool,
    ) -> Result<String, ModelError> {
        if port.direction != Direction::Output && !local_inside {
            return Err(ModelError(format!("Cannot write to input port \"{}\".", port.name)));
        }
        let mut reference = self.reference(port, channel, offset);
        if local_inside {
            reference = format!("{}_inside", reference);
        }
        Ok(format!("{} = {}", reference, value))
    }

    fn parameter_reference(&self, parameter: &Parameter, offset: Option<&str>) -> Result<Option<String>, ModelError> {
        if !parameter.modifiable {
            return Ok(None);
        }
        let mut reference = format!("{}_{}", self.variable_prefix(), generate_name(&parameter.name));
        if let Some(offset) = offset {
            reference.push_str(&format!("[{}]", offset));
        }
        Ok(Some(reference))
    }

    fn port_reference(&self, port: &Port, channel: &str, offset: &str, _is_write: bool) -> Result<String, ModelError> {
        Ok(self.reference(port, channel, offset))
    }
}
