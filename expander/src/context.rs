use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use crate::model::Component;

/// Macro contributed by a target backend or adapter. It ignores its
/// arguments and renders text for the current component.
pub type AdapterMacro = Rc<dyn Fn(&dyn Component) -> String>;

/// A user-supplied macro with a validate-then-handle contract.
pub trait UserMacro {
    /// Reject argument lists the macro cannot handle.
    fn check_arguments(&self, arguments: &[String]) -> Result<(), String>;

    fn handle_macro(&self, arguments: &[String]) -> Result<String, String>;
}

/// Macros beyond the built-in set, looked up by name.
///
/// Adapter macros are tried before user macros.
#[derive(Default, Clone)]
pub struct MacroRegistry {
    adapter: HashMap<String, AdapterMacro>,
    user: HashMap<String, Rc<dyn UserMacro>>,
}

impl MacroRegistry {
    pub fn register_adapter(&mut self, name: impl Into<String>, handler: impl Fn(&dyn Component) -> String + 'static) {
        self.adapter.insert(name.into(), Rc::new(handler));
    }

    pub fn register_user(&mut self, name: impl Into<String>, handler: impl UserMacro + 'static) {
        self.user.insert(name.into(), Rc::new(handler));
    }

    pub fn adapter(&self, name: &str) -> Option<AdapterMacro> {
        self.adapter.get(name).cloned()
    }

    pub fn user(&self, name: &str) -> Option<Rc<dyn UserMacro>> {
        self.user.get(name).cloned()
    }
}

/// State shared by every template expanded during one generation run.
///
/// The `*_used` sets record runtime support the generated code refers to,
/// so the generator knows which type and function definitions to emit.
pub struct GenerationContext {
    pub functions_used: BTreeSet<String>,
    pub token_functions_used: BTreeSet<String>,
    pub new_types_used: BTreeSet<String>,
    /// Values for `${NAME}` when no variable of that name is in scope.
    pub constants: BTreeMap<String, String>,
    pub macros: MacroRegistry,
}

impl Default for GenerationContext {
    fn default() -> Self {
        let constants = [
            ("PI", std::f64::consts::PI.to_string()),
            ("pi", std::f64::consts::PI.to_string()),
            ("E", std::f64::consts::E.to_string()),
            ("e", std::f64::consts::E.to_string()),
            ("NaN", "NaN".to_string()),
            ("Infinity", "Infinity".to_string()),
            ("MaxInt", i32::MAX.to_string()),
            ("MinInt", i32::MIN.to_string()),
            ("MaxLong", i64::MAX.to_string()),
            ("MinLong", i64::MIN.to_string()),
            ("MaxUnsignedByte", u8::MAX.to_string()),
            ("MinUnsignedByte", u8::MIN.to_string()),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        GenerationContext {
            functions_used: BTreeSet::new(),
            token_functions_used: BTreeSet::new(),
            new_types_used: BTreeSet::new(),
            constants,
            macros: MacroRegistry::default(),
        }
    }
}

impl GenerationContext {
    pub fn new() -> Self {
        GenerationContext::default()
    }

    pub fn with_macros(mut self, macros: MacroRegistry) -> Self {
        self.macros = macros;
        self
    }

    /// Add `CWD`, `HOME` and `TMPDIR` from the process environment.
    pub fn with_environment_constants(mut self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.constants.insert("CWD".into(), cwd.display().to_string());
        }
        if let Ok(home) = std::env::var("HOME") {
            self.constants.insert("HOME".into(), home);
        }
        self.constants
            .insert("TMPDIR".into(), std::env::temp_dir().display().to_string());
        self
    }
}
