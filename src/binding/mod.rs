//! Bindings: a key plus the strategy that produces its value.
//!
//! A [`Binding`] is a cheap, clonable handle. Every mutator takes `&self`
//! and hands the binding back, so configuration reads as a chain:
//!
//! ```ignore
//! ctx.bind("services.greeter")?
//!     .to_class::<Greeter>()?
//!     .in_scope(BindingScope::Singleton)?
//!     .tag("service")?;
//! ```
//!
//! Once [`Binding::lock`] is called, the strategy, scope and tags are frozen
//! and every further mutation fails with [`Error::BindingLocked`].

mod cache;
mod key;
mod options;

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::context::Context;
use crate::di::{Injectable, Provider};
use crate::error::{Error, Result};
use crate::inject::MetadataRegistry;
use crate::instantiator::Constructor;
use crate::pattern::Pattern;
use crate::resolution::ValueOrFuture;
use crate::session::ResolutionSession;
use crate::value::BoundValue;

pub(crate) use cache::CacheSlot;
pub use key::{KeyWithPath, PATH_SEPARATOR};
pub use options::merge_options;

use options::OptionsState;

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

/// How long a resolved value is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BindingScope {
    /// A new value on every resolution.
    #[default]
    Transient,
    /// One value per resolving context.
    Context,
    /// One value for the lifetime of the binding.
    Singleton,
}

/// The kind of value source a binding is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingType {
    Constant,
    DynamicValue,
    Class,
    Provider,
}

type DynamicFactory = Arc<dyn Fn() -> ValueOrFuture<BoundValue> + Send + Sync>;

#[derive(Clone)]
enum Strategy {
    Unbound,
    Constant(BoundValue),
    DynamicValue(DynamicFactory),
    Class(Constructor),
    Provider(Constructor),
}

impl Strategy {
    fn binding_type(&self) -> Option<BindingType> {
        match self {
            Self::Unbound => None,
            Self::Constant(_) => Some(BindingType::Constant),
            Self::DynamicValue(_) => Some(BindingType::DynamicValue),
            Self::Class(_) => Some(BindingType::Class),
            Self::Provider(_) => Some(BindingType::Provider),
        }
    }
}

struct BindingState {
    scope: BindingScope,
    strategy: Strategy,
    tags: BTreeSet<String>,
    is_locked: bool,
    options: OptionsState,
    /// Bumped whenever the strategy or scope changes, invalidating
    /// context-scoped values cached under the previous configuration.
    generation: u64,
}

struct BindingInner {
    id: u64,
    key: String,
    state: RwLock<BindingState>,
    singleton: CacheSlot,
}

/// A named slot in a [`Context`].
#[derive(Clone)]
pub struct Binding {
    inner: Arc<BindingInner>,
}

/// Serialized shape of a binding, as returned by [`Binding::to_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingDescription {
    pub key: String,
    pub scope: BindingScope,
    pub tags: Vec<String>,
    pub is_locked: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub binding_type: Option<BindingType>,
}

impl Binding {
    /// Creates an unbound, transient binding.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        key::validate_key(&key)?;
        Ok(Self {
            inner: Arc::new(BindingInner {
                id: NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed),
                key,
                state: RwLock::new(BindingState {
                    scope: BindingScope::default(),
                    strategy: Strategy::Unbound,
                    tags: BTreeSet::new(),
                    is_locked: false,
                    options: OptionsState::default(),
                    generation: 0,
                }),
                singleton: CacheSlot::new(),
            }),
        })
    }

    // ========================================================================
    // Key helpers
    // ========================================================================

    /// Builds `key#path`.
    pub fn build_key_with_path(key: &str, path: &str) -> String {
        key::build_key_with_path(key, path)
    }

    /// Splits `key#path` into its key and optional path.
    pub fn parse_key_with_path(key_with_path: &str) -> KeyWithPath {
        key::parse_key_with_path(key_with_path)
    }

    pub fn validate_key(key: &str) -> Result<()> {
        key::validate_key(key)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn scope(&self) -> BindingScope {
        self.inner.state.read().scope
    }

    /// The configured strategy kind; `None` while unbound.
    pub fn binding_type(&self) -> Option<BindingType> {
        self.inner.state.read().strategy.binding_type()
    }

    pub fn tags(&self) -> BTreeSet<String> {
        self.inner.state.read().tags.clone()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.inner.state.read().tags.contains(tag)
    }

    /// True if any tag matches the pattern.
    pub fn has_tag_matching(&self, pattern: &Pattern) -> bool {
        self.inner.state.read().tags.iter().any(|t| pattern.matches(t))
    }

    pub fn is_locked(&self) -> bool {
        self.inner.state.read().is_locked
    }

    /// Identity comparison.
    pub fn same_as(&self, other: &Binding) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Freezes the strategy, scope and tags.
    pub fn lock(&self) -> Binding {
        self.inner.state.write().is_locked = true;
        self.clone()
    }

    pub fn tag(&self, tag: impl Into<String>) -> Result<Binding> {
        let tag = tag.into();
        self.update(|state| {
            state.tags.insert(tag);
        })
    }

    /// Adds several tags at once.
    pub fn tag_all<I, S>(&self, tags: I) -> Result<Binding>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        self.update(|state| state.tags.extend(tags))
    }

    /// Changing the scope drops any value cached under the previous one.
    pub fn in_scope(&self, scope: BindingScope) -> Result<Binding> {
        let mut changed = false;
        let binding = self.update(|state| {
            if state.scope != scope {
                state.scope = scope;
                state.generation += 1;
                changed = true;
            }
        })?;
        if changed {
            self.inner.singleton.clear();
        }
        Ok(binding)
    }

    /// Binds to a constant value.
    pub fn to<T: Any + Send + Sync>(&self, value: T) -> Result<Binding> {
        self.to_bound_value(BoundValue::new(value))
    }

    /// Binds to an already type-erased value.
    pub fn to_bound_value(&self, value: BoundValue) -> Result<Binding> {
        self.set_strategy(Strategy::Constant(value))
    }

    /// Binds to a factory invoked on every (uncached) resolution.
    pub fn to_dynamic_value<T, F>(&self, factory: F) -> Result<Binding>
    where
        T: Any + Send + Sync,
        F: Fn() -> ValueOrFuture<T> + Send + Sync + 'static,
    {
        let factory: DynamicFactory = Arc::new(move || factory().map(BoundValue::new));
        self.set_strategy(Strategy::DynamicValue(factory))
    }

    /// Binds to an async factory.
    pub fn to_async_dynamic_value<T, F, Fut>(&self, factory: F) -> Result<Binding>
    where
        T: Any + Send + Sync,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.to_dynamic_value(move || ValueOrFuture::pending(factory()))
    }

    /// Binds to a class instantiated with injected dependencies.
    ///
    /// Injection declarations of `T` are validated here; a malformed
    /// declaration fails the binding instead of a later resolution.
    pub fn to_class<T: Injectable>(&self) -> Result<Binding> {
        self.to_class_as::<T, T>(|instance| instance)
    }

    /// Binds to a class and converts each instance before caching it.
    ///
    /// Typically used to store a trait object:
    ///
    /// ```ignore
    /// binding.to_class_as::<BasicAuth, Arc<dyn Authenticator>>(|a| Arc::new(a) as Arc<dyn Authenticator>)?;
    /// ```
    pub fn to_class_as<T, U>(&self, convert: fn(T) -> U) -> Result<Binding>
    where
        T: Injectable,
        U: Any + Send + Sync,
    {
        MetadataRegistry::global().ensure_declared::<T>()?;
        self.set_strategy(Strategy::Class(Constructor::class(convert)))
    }

    /// Binds to a provider: the provider is instantiated with injection and
    /// its `value()` becomes the bound value.
    pub fn to_provider<P: Provider>(&self) -> Result<Binding> {
        MetadataRegistry::global().ensure_declared::<P>()?;
        self.set_strategy(Strategy::Provider(Constructor::provider::<P>()))
    }

    /// Merges options into the binding's options object.
    ///
    /// Options are configuration, not part of the locked state.
    pub fn with_options(&self, options: JsonValue) -> Binding {
        let mut state = self.inner.state.write();
        let current = std::mem::take(&mut state.options);
        state.options = current.merge(options);
        self.clone()
    }

    /// Merges options that are still being computed.
    pub fn with_options_async<F>(&self, options: F) -> Binding
    where
        F: Future<Output = Result<JsonValue>> + Send + 'static,
    {
        let mut state = self.inner.state.write();
        let current = std::mem::take(&mut state.options);
        state.options = current.merge_pending(options);
        self.clone()
    }

    /// The merged options; pending while any async input is.
    pub fn options(&self) -> ValueOrFuture<JsonValue> {
        self.inner.state.read().options.get()
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolves the value in `ctx`, honoring the binding's scope.
    ///
    /// A value already cached for the current configuration is returned
    /// before cycle detection, like any other shared instance.
    pub fn get_value(
        &self,
        ctx: &Context,
        session: Option<&ResolutionSession>,
    ) -> ValueOrFuture<BoundValue> {
        let (scope, strategy, generation) = {
            let state = self.inner.state.read();
            (state.scope, state.strategy.clone(), state.generation)
        };
        let slot = match scope {
            BindingScope::Transient => None,
            BindingScope::Singleton => Some(self.inner.singleton.clone()),
            BindingScope::Context => Some(ctx.scoped_slot(self.id())),
        };
        if let Some(value) = slot.as_ref().and_then(|slot| slot.peek(generation)) {
            return ValueOrFuture::ready(value);
        }

        let session = match session.cloned().unwrap_or_default().enter_binding(self) {
            Ok(session) => session,
            Err(err) => return ValueOrFuture::err(err),
        };

        tracing::trace!(key = %self.key(), ?scope, context = %ctx.name(), "resolving binding");

        match slot {
            None => self.produce(strategy, ctx, &session),
            Some(slot) => slot.get_or_compute(self.key(), generation, || {
                self.produce(strategy, ctx, &session)
            }),
        }
    }

    fn produce(
        &self,
        strategy: Strategy,
        ctx: &Context,
        session: &ResolutionSession,
    ) -> ValueOrFuture<BoundValue> {
        match strategy {
            Strategy::Unbound => ValueOrFuture::err(Error::UnboundKey {
                key: self.key().to_string(),
            }),
            Strategy::Constant(value) => ValueOrFuture::ready(value),
            Strategy::DynamicValue(factory) => factory(),
            Strategy::Class(constructor) | Strategy::Provider(constructor) => {
                constructor.build(ctx, session)
            }
        }
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    pub fn describe(&self) -> BindingDescription {
        let state = self.inner.state.read();
        BindingDescription {
            key: self.key().to_string(),
            scope: state.scope,
            tags: state.tags.iter().cloned().collect(),
            is_locked: state.is_locked,
            binding_type: state.strategy.binding_type(),
        }
    }

    /// `{ key, scope, tags, isLocked, type? }`; `type` is omitted while unbound.
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self.describe()).unwrap_or(JsonValue::Null)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn update<F>(&self, f: F) -> Result<Binding>
    where
        F: FnOnce(&mut BindingState),
    {
        let mut state = self.inner.state.write();
        if state.is_locked {
            return Err(Error::BindingLocked {
                key: self.key().to_string(),
            });
        }
        f(&mut state);
        Ok(self.clone())
    }

    fn set_strategy(&self, strategy: Strategy) -> Result<Binding> {
        let binding = self.update(|state| {
            state.strategy = strategy;
            state.generation += 1;
        })?;
        self.inner.singleton.clear();
        Ok(binding)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Binding")
            .field("key", &self.inner.key)
            .field("scope", &state.scope)
            .field("type", &state.strategy.binding_type())
            .field("tags", &state.tags)
            .field("is_locked", &state.is_locked)
            .finish()
    }
}
