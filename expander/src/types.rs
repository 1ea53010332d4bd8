use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Data type of a port or parameter, as far as code generation cares.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum DataType {
    Int,
    Double,
    String,
    Long,
    Boolean,
    UnsignedByte,
    Pointer,
    Complex,
    Object,
    Matrix,
    Scalar,
    General,
    Unknown,
    /// Element type and, when fixed, the length.
    Array(Box<DataType>, Option<usize>),
    Record(Vec<(String, DataType)>),
}

impl DataType {
    /// Innermost element type of nested arrays; `self` otherwise.
    pub fn innermost_element(&self) -> &DataType {
        match self {
            DataType::Array(element, _) => element.innermost_element(),
            other => other,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => f.write_str("int"),
            DataType::Double => f.write_str("double"),
            DataType::String => f.write_str("string"),
            DataType::Long => f.write_str("long"),
            DataType::Boolean => f.write_str("boolean"),
            DataType::UnsignedByte => f.write_str("unsignedByte"),
            DataType::Pointer => f.write_str("pointer"),
            DataType::Complex => f.write_str("complex"),
            DataType::Object => f.write_str("object"),
            DataType::Matrix => f.write_str("matrix"),
            DataType::Scalar => f.write_str("scalar"),
            DataType::General => f.write_str("general"),
            DataType::Unknown => f.write_str("unknown"),
            DataType::Array(element, Some(length)) => write!(f, "arrayType({},{})", element, length),
            DataType::Array(element, None) => write!(f, "arrayType({})", element),
            DataType::Record(fields) => {
                f.write_str("{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} = {}", name, ty)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl FromStr for DataType {
    type Err = String;

    /// Parses the names produced by `Display`, case-insensitively, plus
    /// `{T}` as shorthand for an array of `T`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Some(inner) = s.strip_prefix("arrayType(").and_then(|r| r.strip_suffix(')')) {
            let parts = codestream::scan::parse_list(inner);
            return match parts.as_slice() {
                [element] => Ok(DataType::Array(Box::new(element.parse()?), None)),
                [element, length] => {
                    let length = length
                        .parse()
                        .map_err(|_| format!("invalid array length '{}'", length))?;
                    Ok(DataType::Array(Box::new(element.parse()?), Some(length)))
                }
                _ => Err(format!("invalid array type '{}'", s)),
            };
        }

        if let Some(inner) = s.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            let is_record = match (inner.find('='), inner.find('{')) {
                (Some(equals), Some(brace)) => equals < brace,
                (equals, _) => equals.is_some(),
            };
            if !is_record {
                return Ok(DataType::Array(Box::new(inner.parse()?), None));
            }
            // Commas inside nested records do not separate fields.
            let fields = codestream::scan::parse_parameter_list_with(s, 0, s.len() - 1, '{', '}')
                .into_iter()
                .map(|field| {
                    let (name, ty) = field
                        .split_once('=')
                        .ok_or_else(|| format!("invalid record field '{}'", field.trim()))?;
                    Ok((name.trim().to_string(), ty.parse()?))
                })
                .collect::<Result<Vec<_>, String>>()?;
            return Ok(DataType::Record(fields));
        }

        match s.to_ascii_lowercase().as_str() {
            "int" => Ok(DataType::Int),
            "double" => Ok(DataType::Double),
            "string" => Ok(DataType::String),
            "long" => Ok(DataType::Long),
            "boolean" => Ok(DataType::Boolean),
            "unsignedbyte" => Ok(DataType::UnsignedByte),
            "pointer" => Ok(DataType::Pointer),
            "complex" => Ok(DataType::Complex),
            "object" => Ok(DataType::Object),
            "matrix" => Ok(DataType::Matrix),
            "scalar" => Ok(DataType::Scalar),
            "general" => Ok(DataType::General),
            "unknown" => Ok(DataType::Unknown),
            _ => Err(format!("unknown data type '{}'", s)),
        }
    }
}

impl TryFrom<String> for DataType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// Target type mapping
// ---------------------------------------------------------------------------

/// How a code generator names data types in generated code.
pub trait TypeSystem {
    /// Name used for runtime type tags and function tables (`Int`, `Array`).
    fn code_gen_type(&self, ty: &DataType) -> String;

    /// Declaration type in the target language (`int`, `char*`).
    fn target_type(&self, ty: &DataType) -> String;

    /// Whether values of this code-gen type are unboxed in generated code.
    fn is_primitive(&self, code_gen_type: &str) -> bool;

    fn is_primitive_type(&self, ty: &DataType) -> bool {
        self.is_primitive(&self.code_gen_type(ty))
    }
}

/// Built-in target languages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    C,
    Java,
}

const C_PRIMITIVES: &[&str] = &[
    "Int",
    "Double",
    "String",
    "Long",
    "Boolean",
    "UnsignedByte",
    "Pointer",
];

const JAVA_PRIMITIVES: &[&str] = &["Int", "Double", "String", "Long", "Boolean", "UnsignedByte"];

impl TypeSystem for Target {
    fn code_gen_type(&self, ty: &DataType) -> String {
        match ty {
            DataType::Int => "Int".into(),
            DataType::Double => "Double".into(),
            DataType::String => "String".into(),
            DataType::Long => "Long".into(),
            DataType::Boolean => "Boolean".into(),
            DataType::UnsignedByte => "UnsignedByte".into(),
            DataType::Pointer => "Pointer".into(),
            DataType::Complex => "Complex".into(),
            DataType::Object => "Object".into(),
            DataType::Matrix => "Matrix".into(),
            DataType::Scalar => "Scalar".into(),
            DataType::Array(..) => "Array".into(),
            DataType::General | DataType::Unknown => "Token".into(),
            DataType::Record(fields) => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|(name, ty)| format!("{} = {}", name, self.code_gen_type(ty)))
                    .collect();
                format!("{{{}}}", fields.join(", "))
            }
        }
    }

    fn target_type(&self, ty: &DataType) -> String {
        let name = match (self, ty) {
            (_, DataType::Int) => "int",
            (_, DataType::Double) => "double",
            (_, DataType::Boolean) => "boolean",
            (Target::C, DataType::String) => "char*",
            (Target::C, DataType::Long) => "long long",
            (Target::C, DataType::UnsignedByte) => "unsigned char",
            (Target::C, DataType::Pointer) => "void*",
            (Target::Java, DataType::String) => "String",
            (Target::Java, DataType::Long) => "long",
            (Target::Java, DataType::UnsignedByte) => "byte",
            _ => "Token",
        };
        name.to_string()
    }

    fn is_primitive(&self, code_gen_type: &str) -> bool {
        match self {
            Target::C => C_PRIMITIVES.contains(&code_gen_type),
            Target::Java => JAVA_PRIMITIVES.contains(&code_gen_type),
        }
    }
}
