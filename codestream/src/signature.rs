use std::cmp::Ordering;
use std::fmt;

/// Identity of a code block: its name plus the number of parameters it takes.
///
/// Blocks may be overloaded on parameter count, so `initBlock()` and
/// `initBlock($)` are different blocks. The canonical rendering is
/// `name($, $)`, and signatures order by that rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockSignature {
    name: String,
    parameter_count: usize,
}

impl BlockSignature {
    pub fn new(name: impl Into<String>, parameter_count: usize) -> Self {
        BlockSignature {
            name: name.into(),
            parameter_count,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }
}

impl fmt::Display for BlockSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for i in 0..self.parameter_count {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str("$")?;
        }
        f.write_str(")")
    }
}

impl Ord for BlockSignature {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string()
            .cmp(&other.to_string())
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.parameter_count.cmp(&other.parameter_count))
    }
}

impl PartialOrd for BlockSignature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
