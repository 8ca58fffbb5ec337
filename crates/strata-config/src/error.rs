//! Error types for patch operations.

use std::path::PathBuf;
use strata_core::{GraphError, ObjectError};
use thiserror::Error;

/// Errors that can occur while loading, saving or building a patch.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create directory
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        /// Path of the directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// The patch is structurally invalid
    #[error("validation failed: {0}")]
    Validation(#[from] crate::validation::ValidationError),

    /// An audio file referenced by the patch could not be loaded
    #[error("failed to load audio '{path}': {source}")]
    LoadAudio {
        /// Resolved path of the audio file.
        path: PathBuf,
        /// Underlying audio I/O error.
        #[source]
        source: strata_io::Error,
    },

    /// An object refused to initialize
    #[error("object '{id}': {source}")]
    Object {
        /// Patch id of the object.
        id: String,
        /// Error raised by the object.
        #[source]
        source: ObjectError,
    },

    /// An output route was rejected by the engine
    #[error("output '{id}': {source}")]
    Route {
        /// Patch id of the routed object.
        id: String,
        /// Error raised by the node manager.
        #[source]
        source: GraphError,
    },
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Create a directory creation error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Attach an object id to an object error.
    pub fn object(id: impl Into<String>, source: ObjectError) -> Self {
        ConfigError::Object {
            id: id.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;
    use std::io;

    #[test]
    fn test_read_file_error() {
        let err = ConfigError::read_file(
            "/path/to/patch.toml",
            io::Error::new(io::ErrorKind::NotFound, "file not found"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/path/to/patch.toml"));
        assert!(msg.contains("file not found"));
    }

    #[test]
    fn test_object_error_names_the_object() {
        let err = ConfigError::object(
            "lp",
            ObjectError::MissingInput {
                object: "filter".to_string(),
                index: 0,
            },
        );
        assert!(err.to_string().starts_with("object 'lp'"));
    }

    #[test]
    fn test_validation_error_conversion() {
        let err: ConfigError = ValidationError::DuplicateId("osc".to_string()).into();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("osc"));
    }
}
