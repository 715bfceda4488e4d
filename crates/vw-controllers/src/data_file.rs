//! Controller backed by a JSON or YAML data file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{BoxError, Controller, ControllerError, ViewData};

/// Supplies the contents of a data file to its views.
///
/// The file is re-read on every [`Controller::process`] call so edits are
/// picked up without a restart. The top level must be a mapping.
#[derive(Debug, Clone)]
pub struct DataFileController {
    name: String,
    views: Vec<String>,
    path: PathBuf,
}

impl DataFileController {
    /// Create a controller for `views` reading from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Configuration`] if `views` is empty or the
    /// file extension is not `json`, `yaml` or `yml`.
    pub fn new(views: Vec<String>, path: impl Into<PathBuf>) -> Result<Self, ControllerError> {
        let path = path.into();
        if views.is_empty() {
            return Err(ControllerError::configuration(format!(
                "data file {} is not bound to any view",
                path.display()
            )));
        }
        if Format::of(&path).is_none() {
            return Err(ControllerError::configuration(format!(
                "unsupported data file {}: expected .json, .yaml or .yml",
                path.display()
            )));
        }

        Ok(Self {
            name: format!("data:{}", path.display()),
            views,
            path,
        })
    }

    /// Path of the data file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the data file.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Io`] if the file cannot be read and
    /// [`ControllerError::Parse`] if it is not a mapping.
    pub fn load(&self) -> Result<ViewData, ControllerError> {
        let content = fs::read_to_string(&self.path).map_err(|source| ControllerError::Io {
            path: self.path.clone(),
            source,
        })?;

        let parse_error = |message: String| ControllerError::Parse {
            path: self.path.clone(),
            message,
        };

        let value: serde_json::Value = match Format::of(&self.path) {
            Some(Format::Json) => {
                serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?
            }
            Some(Format::Yaml) => {
                serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?
            }
            None => return Err(parse_error("unsupported extension".to_owned())),
        };

        match value {
            serde_json::Value::Object(map) => Ok(map),
            serde_json::Value::Null => Ok(ViewData::new()),
            _ => Err(parse_error("top level must be a mapping".to_owned())),
        }
    }
}

impl Controller for DataFileController {
    fn name(&self) -> &str {
        &self.name
    }

    fn views(&self) -> &[String] {
        &self.views
    }

    fn process(&self) -> Result<ViewData, BoxError> {
        Ok(self.load()?)
    }
}

#[derive(Clone, Copy)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn of(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}
