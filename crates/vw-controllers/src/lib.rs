//! View to controller data binding.
//!
//! A [`Controller`] declares the views it supplies data for and produces a
//! [`ViewData`] mapping on demand. The [`ControllerRegistry`] holds controllers
//! in registration order and merges the output of every controller bound to a
//! view, with later controllers overwriting earlier keys.
//!
//! # Example
//!
//! ```
//! use vw_controllers::{Controller, ControllerRef, ControllerRegistry, BoxError, ViewData};
//!
//! struct Home {
//!     views: Vec<String>,
//! }
//!
//! impl Controller for Home {
//!     fn views(&self) -> &[String] {
//!         &self.views
//!     }
//!
//!     fn process(&self) -> Result<ViewData, BoxError> {
//!         let mut data = ViewData::new();
//!         data.insert("title".to_owned(), "Welcome".into());
//!         Ok(data)
//!     }
//! }
//!
//! let mut registry = ControllerRegistry::new();
//! registry
//!     .register(ControllerRef::instance(Home { views: vec!["home".to_owned()] }))
//!     .unwrap();
//!
//! let data = registry.resolve("home").unwrap();
//! assert_eq!(data["title"], "Welcome");
//! assert!(registry.resolve("about").unwrap().is_empty());
//! ```

mod data_file;
mod registry;

use std::path::PathBuf;

pub use data_file::DataFileController;
pub use registry::{ControllerRef, ControllerRegistry, Factory, IntoControllerRefs};

/// Data produced by a controller and passed to the template engine.
pub type ViewData = serde_json::Map<String, serde_json::Value>;

/// Boxed error returned by controller code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A data-producing handler bound to one or more views.
pub trait Controller: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// View identifiers this controller supplies data for.
    fn views(&self) -> &[String];

    /// Produce the data for a render.
    fn process(&self) -> Result<ViewData, BoxError>;
}

/// Error returned by controller registration or data resolution.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// A controller could not be constructed. Fatal at startup.
    #[error("Controller configuration error: {message}")]
    Configuration {
        /// What went wrong.
        message: String,
        /// Underlying construction error, if any.
        #[source]
        source: Option<BoxError>,
    },
    /// A bound controller failed while producing data.
    #[error("Controller {controller} failed for view {view}")]
    Process {
        /// Controller name.
        controller: String,
        /// View being rendered.
        view: String,
        /// Error returned by [`Controller::process`].
        #[source]
        source: BoxError,
    },
    /// A data file could not be read.
    #[error("Failed to read controller data {}: {source}", path.display())]
    Io {
        /// Data file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A data file could not be parsed into a mapping.
    #[error("Invalid controller data {}: {message}", path.display())]
    Parse {
        /// Data file path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
}

impl ControllerError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }
}
