//! Injection points and the resolvers behind them.
//!
//! An [`InjectionSpec`] says what to inject: a binding key plus, for the
//! special forms, a custom resolver. The helpers in this module build the
//! forms supported out of the box:
//!
//! | helper          | injects                                              |
//! |-----------------|------------------------------------------------------|
//! | [`key`]         | the value bound to a key (`key#path` allowed)        |
//! | [`getter`]      | a [`Getter`] that resolves the key later             |
//! | [`setter`]      | a [`Setter`] that binds the key to a constant        |
//! | [`options`]     | a property of the current binding's options          |
//! | [`tag`]         | values of every binding with a matching tag          |
//!
//! # Example
//!
//! ```ignore
//! impl Injectable for Service {
//!     fn declare(decl: &mut Declarations) -> Result<(), DeclarationError> {
//!         decl.parameter(0, inject::key("db"))?
//!             .parameter(1, inject::tag("plugin"))?
//!             .property("log_level", inject::options("log.level"))?;
//!         Ok(())
//!     }
//!     ...
//! }
//! ```

mod registry;
mod resolvers;

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::context::Context;
use crate::error::DeclarationError;
use crate::pattern::Pattern;
use crate::resolution::ValueOrFuture;
use crate::session::ResolutionSession;
use crate::value::BoundValue;

pub use registry::{Declarations, InjectionPoint, MetadataRegistry, TypeInjections};
pub use resolvers::{Getter, Setter};

/// A custom resolution function for an injection.
pub type ResolverFn =
    Arc<dyn Fn(&Context, &Injection, &ResolutionSession) -> ValueOrFuture<BoundValue> + Send + Sync>;

/// What to inject at one injection point.
#[derive(Clone)]
pub struct InjectionSpec {
    pub binding_key: String,
    pub metadata: Map<String, JsonValue>,
    pub resolve: Option<ResolverFn>,
}

impl InjectionSpec {
    pub fn new(binding_key: impl Into<String>) -> Self {
        Self {
            binding_key: binding_key.into(),
            metadata: Map::new(),
            resolve: None,
        }
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(name.into(), value);
        self
    }

    /// Replaces plain key lookup with a custom resolver.
    pub fn with_resolver<F>(mut self, resolve: F) -> Self
    where
        F: Fn(&Context, &Injection, &ResolutionSession) -> ValueOrFuture<BoundValue>
            + Send
            + Sync
            + 'static,
    {
        self.resolve = Some(Arc::new(resolve));
        self
    }
}

impl fmt::Debug for InjectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionSpec")
            .field("binding_key", &self.binding_key)
            .field("metadata", &self.metadata)
            .field("custom_resolver", &self.resolve.is_some())
            .finish()
    }
}

/// A declared injection point on a type.
#[derive(Clone)]
pub struct Injection {
    /// Type the injection is declared on.
    pub target: &'static str,
    /// Method or property name; `None` for constructor parameters.
    pub member: Option<String>,
    /// Parameter position; `None` for properties.
    pub parameter_index: Option<usize>,
    pub binding_key: String,
    pub metadata: Map<String, JsonValue>,
    pub resolve: Option<ResolverFn>,
}

impl Injection {
    /// `Type.constructor[0]`, `Type.method[1]` or `Type.property`.
    pub fn describe(&self) -> String {
        let target = short_type_name(self.target);
        match (&self.member, self.parameter_index) {
            (None, Some(index)) => format!("{target}.constructor[{index}]"),
            (Some(method), Some(index)) => format!("{target}.{method}[{index}]"),
            (Some(property), None) => format!("{target}.{property}"),
            (None, None) => target.to_string(),
        }
    }

    /// Metadata entry `name`, if any.
    pub fn metadata(&self, name: &str) -> Option<&JsonValue> {
        self.metadata.get(name)
    }
}

impl fmt::Debug for Injection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injection")
            .field("target", &self.describe())
            .field("binding_key", &self.binding_key)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Last path segment of a type name, keeping generic arguments intact.
pub fn short_type_name(full: &str) -> &str {
    let base_end = full.find('<').unwrap_or(full.len());
    let start = full[..base_end].rfind("::").map(|i| i + 2).unwrap_or(0);
    &full[start..]
}

// ============================================================================
// Injection helpers
// ============================================================================

/// Injects the value bound to `key`; `key#path` injects a deep property.
pub fn key(key: impl Into<String>) -> InjectionSpec {
    InjectionSpec::new(key)
}

/// Injects a [`Getter`] for `key` instead of its value.
///
/// Resolution of the key is deferred until the getter is called, which also
/// breaks circular dependencies between classes.
pub fn getter(key: impl Into<String>) -> InjectionSpec {
    InjectionSpec::new(key)
        .with_metadata("decorator", JsonValue::from("inject.getter"))
        .with_resolver(resolvers::resolve_as_getter)
}

/// Injects a [`Setter`] that binds `key` to a constant.
pub fn setter(key: impl Into<String>) -> InjectionSpec {
    InjectionSpec::new(key)
        .with_metadata("decorator", JsonValue::from("inject.setter"))
        .with_resolver(resolvers::resolve_as_setter)
}

/// Injects a property of the options of the binding being resolved.
///
/// `path` is dot-delimited; an empty path injects the whole options object.
/// Outside of a binding resolution the value is undefined.
pub fn options(path: impl Into<String>) -> InjectionSpec {
    let path: String = path.into();
    let path = path.strip_prefix('#').unwrap_or(&path).to_string();
    InjectionSpec::new(path)
        .with_metadata("decorator", JsonValue::from("inject.options"))
        .with_resolver(resolvers::resolve_from_options)
}

/// Injects the values of all visible bindings with a tag matching `pattern`.
///
/// The injected value is a `Vec<BoundValue>` in discovery order; extract it
/// as `Vec<T>` for any `T: FromBoundValue`.
pub fn tag(pattern: impl Into<Pattern>) -> InjectionSpec {
    let pattern = pattern.into();
    InjectionSpec::new("")
        .with_metadata("decorator", JsonValue::from("inject.tag"))
        .with_metadata("tag", JsonValue::from(pattern.as_str()))
        .with_resolver(move |ctx, _injection, session| {
            resolvers::resolve_by_tag(ctx, &pattern, session)
        })
}

/// Like [`tag`], with a regular expression.
pub fn tag_regex(pattern: &str) -> Result<InjectionSpec, DeclarationError> {
    Ok(tag(Pattern::regex(pattern)?))
}

/// Injection points declared on `T`, registering `T` on first use.
pub fn describe_injected_arguments<T: crate::di::Injectable>(
    method: Option<&str>,
) -> Result<Vec<Arc<Injection>>, DeclarationError> {
    let declared = MetadataRegistry::global().ensure_declared::<T>()?;
    Ok(declared.arguments(method).to_vec())
}

/// Property injections declared on `T`, in declaration order.
pub fn describe_injected_properties<T: crate::di::Injectable>(
) -> Result<Vec<Arc<Injection>>, DeclarationError> {
    let declared = MetadataRegistry::global().ensure_declared::<T>()?;
    Ok(declared.properties().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("my_crate::services::Greeter"), "Greeter");
        assert_eq!(short_type_name("Greeter"), "Greeter");
        assert_eq!(
            short_type_name("my_crate::Wrapper<my_crate::Inner>"),
            "Wrapper<my_crate::Inner>"
        );
    }

    #[test]
    fn test_describe_injection() {
        let mut injection = Injection {
            target: "app::Service",
            member: None,
            parameter_index: Some(0),
            binding_key: "db".into(),
            metadata: Map::new(),
            resolve: None,
        };
        assert_eq!(injection.describe(), "Service.constructor[0]");
        injection.member = Some("greet".into());
        assert_eq!(injection.describe(), "Service.greet[0]");
        injection.parameter_index = None;
        assert_eq!(injection.describe(), "Service.greet");
    }

    #[test]
    fn test_helpers_record_metadata() {
        let spec = tag("plugin:*");
        assert_eq!(spec.metadata.get("tag"), Some(&JsonValue::from("plugin:*")));
        assert!(spec.resolve.is_some());

        let spec = options("#a.b");
        assert_eq!(spec.binding_key, "a.b");

        let spec = key("db");
        assert!(spec.resolve.is_none());
        assert!(spec.metadata.is_empty());
    }

    #[test]
    fn test_tag_regex_rejects_invalid_pattern() {
        assert!(matches!(
            tag_regex("["),
            Err(DeclarationError::InvalidPattern { .. })
        ));
    }
}
