//! Error types for binding, resolution and injection declarations.

use std::sync::Arc;

use thiserror::Error;

use crate::config::ConfigError;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A failure raised by application code (factories, constructors, lifecycle hooks).
///
/// Kept behind an `Arc` so that [`Error`] stays `Clone`: in-flight singleton
/// computations hand the same result to every waiting caller.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Errors raised while registering or resolving bindings.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // Binding errors
    #[error("The key '{key}' is not bound to any value")]
    UnboundKey { key: String },

    #[error("The key '{key}' is not bound to any value in context '{context}'")]
    BindingNotFound { key: String, context: String },

    #[error("Cannot modify locked binding '{key}'")]
    BindingLocked { key: String },

    #[error("Cannot rebind key '{key}' to a locked binding")]
    DuplicateBinding { key: String },

    #[error("Invalid binding key '{key}': {reason}")]
    InvalidBindingKey { key: String, reason: &'static str },

    // Resolution errors
    #[error("Circular dependency detected: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("Cannot get '{key}' synchronously: the value is still pending")]
    AsyncResolution { key: String },

    #[error("Value of '{key}' is {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Type '{target}' has no injectable property '{property}'")]
    UnknownProperty {
        target: &'static str,
        property: String,
    },

    // Extension errors
    #[error("Extension '{extension}' does not exist for extension point '{extension_point}'")]
    ExtensionNotFound {
        extension: String,
        extension_point: String,
    },

    // Declaration errors
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(Arc<ConfigError>),

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: SharedError,
    },
}

impl Error {
    /// Wraps an error raised by application code.
    pub fn external<E>(context: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::External {
            context: context.into(),
            source: Arc::new(err),
        }
    }

    /// Wraps an `anyhow` error raised by an application hook.
    pub fn from_anyhow(context: impl Into<String>, err: anyhow::Error) -> Self {
        let boxed: Box<dyn std::error::Error + Send + Sync> = err.into();
        Self::External {
            context: context.into(),
            source: Arc::from(boxed),
        }
    }

    /// Builds an external error from a plain message.
    pub fn message(context: impl Into<String>, message: impl Into<String>) -> Self {
        let message: String = message.into();
        let boxed: Box<dyn std::error::Error + Send + Sync> = message.into();
        Self::External {
            context: context.into(),
            source: Arc::from(boxed),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(Arc::new(err))
    }
}

/// Errors raised while declaring injection points.
///
/// These surface when a type is registered (`to_class`, `to_provider`,
/// `instantiate_class`), never halfway through a resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("Duplicate injection declared for {target}.{member}")]
    DuplicateInjection { target: &'static str, member: String },

    #[error("Injection is not supported for a static property: {target}.{property}")]
    StaticProperty {
        target: &'static str,
        property: String,
    },

    #[error("Injection cannot be used on a method: {target}.{method}()")]
    MethodNotInjectable {
        target: &'static str,
        method: String,
    },

    #[error("Argument {index} of {target}.{member} is not declared for injection")]
    ParameterGap {
        target: &'static str,
        member: String,
        index: usize,
    },

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}
