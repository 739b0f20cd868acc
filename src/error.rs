//! Error types for declaration, materialization, and dispatch

use crate::types::TypeTag;
use std::path::PathBuf;
use thiserror::Error;

/// Raised when a declaration cannot be bound
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("missing type declaration on arguments of '{function}': {names} names, {types} types")]
    ArityMismatch {
        function: String,
        names: usize,
        types: usize,
    },

    #[error("unsupported type {ty} for argument '{argument}' of '{function}'")]
    UnsupportedType {
        function: String,
        argument: String,
        ty: TypeTag,
    },

    #[error("unknown type name '{name}' in declaration of '{function}'")]
    UnknownTypeName { function: String, name: String },
}

/// The runtime could not produce a native handle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed materializing '{symbol}' from {}: {reason}", .library.as_deref().unwrap_or("<no library>"))]
pub struct MaterializationError {
    pub symbol: String,
    pub library: Option<String>,
    pub reason: String,
}

impl MaterializationError {
    pub fn new(symbol: impl Into<String>, library: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            library,
            reason: reason.into(),
        }
    }
}

/// Marshaling or invocation failure inside a native handle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("native handle invoked before its signature was configured")]
    Unconfigured,

    #[error("expected {expected} arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },

    #[error("string argument {index} contains an interior NUL byte")]
    InteriorNul { index: usize },

    #[error("argument {index} value {value} does not fit in a C long")]
    LongOverflow { index: usize, value: i64 },

    #[error("argument {index} is not a {expected} value")]
    Unsupported { index: usize, expected: TypeTag },
}

/// Raised by a bound call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("unsupported arg-types for '{function}': {}. Expected: {}", fmt_tags(.actual), fmt_tags(.expected))]
    TypeMismatch {
        function: String,
        actual: Vec<TypeTag>,
        expected: Vec<TypeTag>,
    },

    #[error(transparent)]
    Materialization(#[from] MaterializationError),

    #[error("call to '{function}' failed: {source}")]
    Dispatch {
        function: String,
        #[source]
        source: DispatchError,
    },
}

/// Reading or binding a declaration manifest failed
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate extern '{0}' in manifest")]
    Duplicate(String),

    #[error("unknown source language '{0}'")]
    UnknownLanguage(String),

    #[error(transparent)]
    Declaration(#[from] DeclarationError),
}

/// Reading runtime configuration failed
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

fn fmt_tags(tags: &[TypeTag]) -> String {
    let names: Vec<_> = tags.iter().map(|t| t.name()).collect();
    format!("[{}]", names.join(", "))
}
