//! Extension points: named groups of pluggable implementations.
//!
//! Extensions are ordinary bindings tagged `extensionPoint:<point>` and
//! `name:<extension>`. Their configuration lives in the context too:
//! `<point>.config` for the point, `<point>.<extension>.config` for each
//! extension. An extension is resolved inside a fresh child context where
//! `config` is bound to its own configuration, so the extension can simply
//! `#[inject("config")]`.
//!
//! Extension values must be stored as `Arc<E>`; bind them with
//! [`Binding::to_class_as`] or a provider returning `Arc<E>`.
//!
//! # Example
//!
//! ```ignore
//! let point = ExtensionPoint::<dyn Greeter>::new("greeters", &ctx);
//! point
//!     .bind_extension("en")?
//!     .to_class_as::<EnglishGreeter, Arc<dyn Greeter>>(|g| Arc::new(g) as Arc<dyn Greeter>)?;
//!
//! for greeter in point.get_all_extensions().await? {
//!     println!("{}", greeter.greet("world"));
//! }
//! ```

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::{json, Value as JsonValue};

use crate::binding::Binding;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::pattern::Pattern;
use crate::value::BoundValue;

/// Key under which an extension finds its configuration while resolving.
pub const CONFIG_KEY: &str = "config";

const EXTENSION_POINT_TAG_PREFIX: &str = "extensionPoint:";
const NAME_TAG_PREFIX: &str = "name:";

/// A named collection of extensions implementing `E`.
pub struct ExtensionPoint<E: ?Sized> {
    name: String,
    context: Context,
    _marker: PhantomData<fn() -> Arc<E>>,
}

impl<E: ?Sized> Clone for ExtensionPoint<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            context: self.context.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E: ?Sized + Send + Sync + 'static> ExtensionPoint<E> {
    pub fn new(name: impl Into<String>, context: &Context) -> Self {
        Self {
            name: name.into(),
            context: context.clone(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Tag carried by every extension of this point.
    pub fn extension_point_tag(&self) -> String {
        format!("{EXTENSION_POINT_TAG_PREFIX}{}", self.name)
    }

    /// Tag carrying an extension's name.
    pub fn name_tag(extension: &str) -> String {
        format!("{NAME_TAG_PREFIX}{extension}")
    }

    /// Name of an extension, read from its `name:` tag.
    pub fn extension_name(binding: &Binding) -> Option<String> {
        binding
            .tags()
            .into_iter()
            .find_map(|tag| tag.strip_prefix(NAME_TAG_PREFIX).map(str::to_string))
    }

    /// Binds `<point>.<extension>` with the extension tags; the caller
    /// configures its value.
    pub fn bind_extension(&self, extension: &str) -> Result<Binding> {
        let binding = self
            .context
            .bind(format!("{}.{extension}", self.name))?
            .tag(self.extension_point_tag())?
            .tag(Self::name_tag(extension))?;
        tracing::debug!(extension_point = %self.name, extension, "registered extension");
        Ok(binding)
    }

    /// Bindings of all extensions visible from the point's context.
    pub fn extension_bindings(&self) -> Vec<Binding> {
        self.context
            .find_by_tag(Pattern::glob(self.extension_point_tag()))
    }

    /// Extension bindings by binding key.
    pub fn extension_binding_map(&self) -> BTreeMap<String, Binding> {
        self.extension_bindings()
            .into_iter()
            .map(|binding| (binding.key().to_string(), binding))
            .collect()
    }

    pub fn extension_binding(&self, extension: &str) -> Result<Binding> {
        self.extension_bindings()
            .into_iter()
            .find(|binding| Self::extension_name(binding).as_deref() == Some(extension))
            .ok_or_else(|| Error::ExtensionNotFound {
                extension: extension.to_string(),
                extension_point: self.name.clone(),
            })
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Configuration of the point itself; `{}` when unbound.
    pub async fn configuration(&self) -> Result<BoundValue> {
        let key = format!("{}.{CONFIG_KEY}", self.name);
        self.config_or_empty(&key).await
    }

    /// Configuration of one extension; `{}` when unbound.
    pub async fn extension_configuration(&self, extension: &str) -> Result<BoundValue> {
        let key = format!("{}.{extension}.{CONFIG_KEY}", self.name);
        self.config_or_empty(&key).await
    }

    async fn config_or_empty(&self, key: &str) -> Result<BoundValue> {
        self.context
            .get_value_or_default(key, BoundValue::json(json!({})), None)
            .into_future()
            .await
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolves one extension by name.
    pub async fn get_extension(&self, extension: &str) -> Result<Arc<E>> {
        let binding = self.extension_binding(extension)?;
        self.resolve_extension(binding).await
    }

    /// Resolves every extension, in discovery order.
    pub async fn get_all_extensions(&self) -> Result<Vec<Arc<E>>> {
        let bindings = self.extension_bindings();
        try_join_all(
            bindings
                .into_iter()
                .map(|binding| self.resolve_extension(binding)),
        )
        .await
    }

    async fn resolve_extension(&self, binding: Binding) -> Result<Arc<E>> {
        // Extensions bound without a `name:` tag get an empty configuration
        let name = Self::extension_name(&binding);
        let config = match &name {
            Some(name) => self.extension_configuration(name).await?,
            None => BoundValue::json(json!({})),
        };

        let scope = self.context.create_child();
        scope.bind(CONFIG_KEY)?.to_bound_value(config)?;

        tracing::trace!(
            extension_point = %self.name,
            extension = name.as_deref().unwrap_or(binding.key()),
            "resolving extension"
        );
        let value = binding.get_value(&scope, None).into_future().await?;
        value
            .downcast_ref::<Arc<E>>()
            .cloned()
            .ok_or_else(|| Error::TypeMismatch {
                key: binding.key().to_string(),
                expected: std::any::type_name::<Arc<E>>(),
                found: value.type_name(),
            })
    }
}

/// Extension point configuration as JSON, for callers that want the raw map.
pub fn configuration_json(value: &BoundValue) -> JsonValue {
    value.as_json().cloned().unwrap_or_else(|| json!({}))
}
