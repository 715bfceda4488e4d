//! Configuration management for vw.
//!
//! Parses `vw.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! Path values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `templates.root`
//! - `templates.views_dir`
//! - `templates.cache_dir`
//! - `controllers[].data`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the template root.
    pub template_root: Option<PathBuf>,
    /// Override the views directory.
    pub views_dir: Option<PathBuf>,
    /// Override the compiled output directory.
    pub cache_dir: Option<PathBuf>,
    /// Override the force-recompile flag.
    pub force_recompile: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "vw.toml";

/// Default views directory, relative to the template root.
const DEFAULT_VIEWS_DIR: &str = "views";

/// Default compiled output directory, relative to the template root.
const DEFAULT_CACHE_DIR: &str = ".views_cache";

/// Name of the view cache subdirectory inside the views directory.
pub const VIEW_CACHE_SEGMENT: &str = "cache";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Template locations (paths are relative strings from TOML).
    templates: TemplatesConfigRaw,
    /// Engine behaviour.
    pub engine: EngineConfig,
    /// Data-file controllers (paths are relative strings from TOML).
    controllers: Vec<ControllerConfigRaw>,

    /// Resolved template locations (set after loading).
    #[serde(skip)]
    pub templates_resolved: TemplatesConfig,
    /// Resolved controllers (set after loading).
    #[serde(skip)]
    pub controllers_resolved: Vec<ControllerConfig>,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw template configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TemplatesConfigRaw {
    root: Option<String>,
    views_dir: Option<String>,
    cache_dir: Option<String>,
}

/// Resolved template locations with absolute paths.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TemplatesConfig {
    /// Candidates must reside under this directory to be rendered.
    pub root: PathBuf,
    /// Directory views are loaded from.
    pub views_dir: PathBuf,
    /// Directory the engine writes compiled output to.
    pub cache_dir: PathBuf,
}

impl TemplatesConfig {
    /// View cache directory (`<views_dir>/cache`) holding source mirrors.
    #[must_use]
    pub fn view_cache_dir(&self) -> PathBuf {
        self.views_dir.join(VIEW_CACHE_SEGMENT)
    }
}

/// Engine configuration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether the engine handles requests at all.
    pub active: bool,
    /// Filter applied to values assigned with `@var`.
    pub sanitize_filter: String,
    /// External capabilities reported as available.
    pub capabilities: Vec<String>,
    /// Recompile root templates on every request.
    pub force_recompile: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            active: true,
            sanitize_filter: "sanitize".to_owned(),
            capabilities: Vec::new(),
            force_recompile: false,
        }
    }
}

/// Raw controller entry as parsed from TOML.
#[derive(Debug, Deserialize, Clone)]
struct ControllerConfigRaw {
    views: Vec<String>,
    data: String,
}

/// Resolved data-file controller entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Views the controller contributes to.
    pub views: Vec<String>,
    /// JSON or YAML file providing the data.
    pub data: PathBuf,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`templates.root`").
        field: String,
        /// Error message (e.g., "${`THEME_DIR`} not set").
        message: String,
    },
}

/// Require a string to be a plain identifier (`[A-Za-z_][A-Za-z0-9_]*`).
fn require_identifier(value: &str, field: &str) -> Result<(), ConfigError> {
    let mut chars = value.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ConfigError::Validation(format!(
            "{field} must be an identifier, got {value:?}"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `vw.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    ///
    /// Overriding the template root re-derives views and cache directories
    /// that were not set explicitly.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(root) = &settings.template_root {
            self.templates_resolved = self.resolve_templates(root.clone());
        }
        if let Some(views_dir) = &settings.views_dir {
            self.templates_resolved.views_dir.clone_from(views_dir);
        }
        if let Some(cache_dir) = &settings.cache_dir {
            self.templates_resolved.cache_dir.clone_from(cache_dir);
        }
        if let Some(force) = settings.force_recompile {
            self.engine.force_recompile = force;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with the template root at `base`.
    fn default_with_base(base: &Path) -> Self {
        Self {
            templates: TemplatesConfigRaw::default(),
            engine: EngineConfig::default(),
            controllers: Vec::new(),
            templates_resolved: TemplatesConfig {
                root: base.to_path_buf(),
                views_dir: base.join(DEFAULT_VIEWS_DIR),
                cache_dir: base.join(DEFAULT_CACHE_DIR),
            },
            controllers_resolved: Vec::new(),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_identifier(&self.engine.sanitize_filter, "engine.sanitize_filter")?;
        for capability in &self.engine.capabilities {
            require_identifier(capability, "engine.capabilities")?;
        }
        self.validate_controllers()
    }

    /// Validate data-file controller entries.
    fn validate_controllers(&self) -> Result<(), ConfigError> {
        for (idx, controller) in self.controllers_resolved.iter().enumerate() {
            if controller.views.is_empty() || controller.views.iter().any(String::is_empty) {
                return Err(ConfigError::Validation(format!(
                    "controllers[{idx}].views must list at least one non-empty view"
                )));
            }
            let ext = controller
                .data
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            if !matches!(ext, "json" | "yaml" | "yml") {
                return Err(ConfigError::Validation(format!(
                    "controllers[{idx}].data must be a .json, .yaml or .yml file"
                )));
            }
        }
        Ok(())
    }

    /// Expand environment variable references in path strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        let templates = &mut self.templates;
        for (value, field) in [
            (&mut templates.root, "templates.root"),
            (&mut templates.views_dir, "templates.views_dir"),
            (&mut templates.cache_dir, "templates.cache_dir"),
        ] {
            if let Some(raw) = value {
                *raw = expand::expand_env(raw, field)?;
            }
        }

        for (idx, controller) in self.controllers.iter_mut().enumerate() {
            controller.data =
                expand::expand_env(&controller.data, &format!("controllers[{idx}].data"))?;
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    ///
    /// The template root is relative to the config directory; views and
    /// cache directories and controller data files are relative to the root.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let root = config_dir.join(self.templates.root.as_deref().unwrap_or("."));
        self.templates_resolved = self.resolve_templates(root);

        let root = &self.templates_resolved.root;
        self.controllers_resolved = self
            .controllers
            .iter()
            .map(|c| ControllerConfig {
                views: c.views.clone(),
                data: root.join(&c.data),
            })
            .collect();
    }

    fn resolve_templates(&self, root: PathBuf) -> TemplatesConfig {
        let views_dir = root.join(self.templates.views_dir.as_deref().unwrap_or(DEFAULT_VIEWS_DIR));
        let cache_dir = root.join(self.templates.cache_dir.as_deref().unwrap_or(DEFAULT_CACHE_DIR));
        TemplatesConfig {
            root,
            views_dir,
            cache_dir,
        }
    }
}
