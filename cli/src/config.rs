use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use codestream::StreamConfig;
use expander::{GenerationContext, ModelComponent, Target};

/// Project file used when `--config` is not given.
pub const DEFAULT_CONFIG: &str = "cgt.toml";

/// Contents of a `cgt.toml` project file. Every table is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub stream: StreamConfig,

    /// Target language for `$targetType` and type conversions.
    pub target: Target,

    /// Component templates are expanded against. Without one, a bare
    /// component named after the template file is used.
    pub component: Option<ModelComponent>,

    /// Extra `${NAME}` constants.
    pub constants: BTreeMap<String, String>,
}

impl ProjectConfig {
    /// Read `path`, or `cgt.toml` in the working directory if it exists.
    pub fn load(path: Option<&Path>) -> Result<ProjectConfig, String> {
        let path: PathBuf = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG);
                if !default.is_file() {
                    return Ok(ProjectConfig::default());
                }
                default
            }
        };

        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
        let config: ProjectConfig = toml::from_str(&text)
            .map_err(|e| format!("invalid project file '{}': {}", path.display(), e))?;
        tracing::debug!(path = %path.display(), "loaded project file");
        Ok(config)
    }

    pub fn component_for(&self, template: &Path) -> ModelComponent {
        self.component
            .clone()
            .unwrap_or_else(|| default_component(template))
    }

    pub fn context(&self) -> GenerationContext {
        let mut context = GenerationContext::new().with_environment_constants();
        context.constants.extend(self.constants.clone());
        context
    }
}

/// A component with no ports or parameters, named after `template`'s stem.
pub fn default_component(template: &Path) -> ModelComponent {
    let name = template
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.split('.').next().unwrap_or(s))
        .unwrap_or("Component");
    ModelComponent::new(name, name)
}
