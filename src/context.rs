//! Contexts: hierarchical registries of bindings.
//!
//! Lookups walk from a context up through its ancestors; the closest owner
//! of a key wins. A context keeps only a weak reference to its parent, so a
//! parent must outlive its children. A child whose parent has been dropped
//! behaves as a root.
//!
//! # Example
//!
//! ```ignore
//! let app = Context::named("app");
//! app.bind("greeting")?.to("hello")?;
//!
//! let request = app.create_child();
//! request.bind("user")?.to("alice")?;
//!
//! let greeting: String = request.get_as("greeting").await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use ulid::Ulid;

use crate::binding::{Binding, CacheSlot, KeyWithPath};
use crate::error::{Error, Result};
use crate::pattern::Pattern;
use crate::resolution::ValueOrFuture;
use crate::session::ResolutionSession;
use crate::value::{BoundValue, FromBoundValue};

/// Insertion-ordered binding registry.
#[derive(Default)]
struct Registry {
    order: Vec<String>,
    entries: HashMap<String, Binding>,
}

impl Registry {
    fn get(&self, key: &str) -> Option<&Binding> {
        self.entries.get(key)
    }

    fn insert(&mut self, binding: Binding) {
        let key = binding.key().to_string();
        if self.entries.insert(key.clone(), binding).is_none() {
            self.order.push(key);
        }
    }

    fn remove(&mut self, key: &str) -> Option<Binding> {
        let removed = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.order.iter().filter_map(|key| self.entries.get(key))
    }
}

struct ContextInner {
    name: String,
    parent: Option<Weak<ContextInner>>,
    registry: RwLock<Registry>,
    /// Context-scoped values, keyed by binding id.
    scoped: Mutex<HashMap<u64, CacheSlot>>,
}

/// A node in the binding hierarchy.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

/// A non-owning handle to a [`Context`].
#[derive(Clone)]
pub struct WeakContext {
    inner: Weak<ContextInner>,
}

impl WeakContext {
    pub fn upgrade(&self) -> Option<Context> {
        self.inner.upgrade().map(|inner| Context { inner })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a root context with a generated name.
    pub fn new() -> Self {
        Self::named(Ulid::new().to_string())
    }

    /// Creates a root context.
    pub fn named(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    /// Creates a child of `parent` with a generated name.
    pub fn with_parent(parent: &Context) -> Self {
        Self::build(Ulid::new().to_string(), Some(parent))
    }

    /// Creates a named child of `parent`.
    pub fn named_child(parent: &Context, name: impl Into<String>) -> Self {
        Self::build(name.into(), Some(parent))
    }

    pub fn create_child(&self) -> Self {
        Self::with_parent(self)
    }

    fn build(name: String, parent: Option<&Context>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                name,
                parent: parent.map(|p| Arc::downgrade(&p.inner)),
                registry: RwLock::new(Registry::default()),
                scoped: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The parent context, if it is still alive.
    pub fn parent(&self) -> Option<Context> {
        let weak = self.inner.parent.as_ref()?;
        match weak.upgrade() {
            Some(inner) => Some(Context { inner }),
            None => {
                tracing::debug!(context = %self.name(), "parent context was dropped");
                None
            }
        }
    }

    pub fn downgrade(&self) -> WeakContext {
        WeakContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Identity comparison.
    pub fn same_as(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Returns a binding for `key` in this context, ready to be configured.
    ///
    /// An existing binding that has not been configured yet is returned as
    /// is. A configured, unlocked one is replaced. A locked one cannot be
    /// replaced.
    pub fn bind(&self, key: impl Into<String>) -> Result<Binding> {
        let key = key.into();
        Binding::validate_key(&key)?;

        let mut registry = self.inner.registry.write();
        if let Some(existing) = registry.get(&key) {
            if existing.is_locked() {
                return Err(Error::DuplicateBinding { key });
            }
            if existing.binding_type().is_none() {
                return Ok(existing.clone());
            }
            self.forget_scoped(existing.id());
        }

        let binding = Binding::new(key.clone())?;
        registry.insert(binding.clone());
        tracing::debug!(context = %self.name(), key = %key, "bound key");
        Ok(binding)
    }

    /// Registers a binding created elsewhere.
    pub fn add(&self, binding: Binding) -> Result<Binding> {
        let mut registry = self.inner.registry.write();
        if let Some(existing) = registry.get(binding.key()) {
            if existing.is_locked() {
                return Err(Error::DuplicateBinding {
                    key: binding.key().to_string(),
                });
            }
            if !existing.same_as(&binding) {
                self.forget_scoped(existing.id());
            }
        }
        tracing::debug!(context = %self.name(), key = %binding.key(), "added binding");
        registry.insert(binding.clone());
        Ok(binding)
    }

    /// Removes a binding owned by this context.
    ///
    /// Returns `false` if this context does not own `key`. Ancestors are not
    /// affected.
    pub fn unbind(&self, key: &str) -> Result<bool> {
        let mut registry = self.inner.registry.write();
        let id = match registry.get(key) {
            None => return Ok(false),
            Some(binding) if binding.is_locked() => {
                return Err(Error::BindingLocked {
                    key: key.to_string(),
                })
            }
            Some(binding) => binding.id(),
        };
        registry.remove(key);
        self.forget_scoped(id);
        tracing::debug!(context = %self.name(), key, "unbound key");
        Ok(true)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// True if this context owns `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.registry.read().get(key).is_some()
    }

    /// True if `key` is bound here or in any ancestor.
    pub fn is_bound(&self, key: &str) -> bool {
        self.contains(key) || self.parent().is_some_and(|p| p.is_bound(key))
    }

    /// The context that owns `key`: this one or the nearest ancestor.
    pub fn owner_context(&self, key: &str) -> Option<Context> {
        if self.contains(key) {
            return Some(self.clone());
        }
        self.parent()?.owner_context(key)
    }

    /// The nearest binding for `key`.
    pub fn find_binding(&self, key: &str) -> Option<Binding> {
        if let Some(binding) = self.inner.registry.read().get(key) {
            return Some(binding.clone());
        }
        self.parent()?.find_binding(key)
    }

    /// The nearest binding for `key`, or [`Error::BindingNotFound`].
    pub fn get_binding(&self, key: &str) -> Result<Binding> {
        self.find_binding(key).ok_or_else(|| Error::BindingNotFound {
            key: key.to_string(),
            context: self.name().to_string(),
        })
    }

    /// Visible bindings whose key matches the pattern.
    ///
    /// Bindings of this context come first, in registration order, followed
    /// by ancestor bindings that are not shadowed by a closer key.
    pub fn find(&self, pattern: impl Into<Pattern>) -> Vec<Binding> {
        let pattern = pattern.into();
        self.find_by(|b| pattern.matches(b.key()))
    }

    /// Visible bindings with at least one tag matching the pattern.
    pub fn find_by_tag(&self, pattern: impl Into<Pattern>) -> Vec<Binding> {
        let pattern = pattern.into();
        self.find_by(|b| b.has_tag_matching(&pattern))
    }

    /// Every visible binding.
    pub fn bindings(&self) -> Vec<Binding> {
        self.find_by(|_| true)
    }

    /// Visible bindings accepted by `filter`.
    pub fn find_by<F>(&self, filter: F) -> Vec<Binding>
    where
        F: Fn(&Binding) -> bool,
    {
        self.collect(&filter)
    }

    fn collect<F>(&self, filter: &F) -> Vec<Binding>
    where
        F: Fn(&Binding) -> bool,
    {
        let mut found: Vec<Binding> = {
            let registry = self.inner.registry.read();
            registry.iter().filter(|b| filter(b)).cloned().collect()
        };
        if let Some(parent) = self.parent() {
            let inherited = parent.collect(filter);
            let registry = self.inner.registry.read();
            found.extend(
                inherited
                    .into_iter()
                    .filter(|b| registry.get(b.key()).is_none()),
            );
        }
        found
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolves `key` (or `key#path`), staying synchronous when possible.
    pub fn get_value_or_future(
        &self,
        key_with_path: &str,
        session: Option<&ResolutionSession>,
    ) -> ValueOrFuture<BoundValue> {
        let KeyWithPath { key, path } = Binding::parse_key_with_path(key_with_path);
        let binding = match self.get_binding(&key) {
            Ok(binding) => binding,
            Err(err) => return ValueOrFuture::err(err),
        };
        let value = binding.get_value(self, session);
        match path {
            None => value,
            Some(path) => value.map(move |v| v.deep_property(&path)),
        }
    }

    /// Resolves `key` (or `key#path`).
    pub async fn get(&self, key_with_path: &str) -> Result<BoundValue> {
        self.get_value_or_future(key_with_path, None)
            .into_future()
            .await
    }

    /// Resolves `key` and converts the value.
    pub async fn get_as<T: FromBoundValue>(&self, key_with_path: &str) -> Result<T> {
        self.get(key_with_path).await?.extract(key_with_path)
    }

    /// Resolves `key` synchronously, failing with [`Error::AsyncResolution`]
    /// if any step in the chain is asynchronous.
    pub fn get_sync(&self, key_with_path: &str) -> Result<BoundValue> {
        self.get_value_or_future(key_with_path, None)
            .into_sync(key_with_path)
    }

    pub fn get_sync_as<T: FromBoundValue>(&self, key_with_path: &str) -> Result<T> {
        self.get_sync(key_with_path)?.extract(key_with_path)
    }

    /// Resolves `key`, falling back to `default` when nothing is bound or
    /// the value is undefined.
    pub fn get_value_or_default(
        &self,
        key_with_path: &str,
        default: BoundValue,
        session: Option<&ResolutionSession>,
    ) -> ValueOrFuture<BoundValue> {
        let key = Binding::parse_key_with_path(key_with_path).key;
        if !self.is_bound(&key) {
            return ValueOrFuture::ready(default);
        }
        self.get_value_or_future(key_with_path, session)
            .map(move |value| if value.is_undefined() { default } else { value })
    }

    /// The slot holding this context's value of a context-scoped binding.
    ///
    /// The slot tracks the binding's generation itself, so a reconfigured
    /// binding reuses it.
    pub(crate) fn scoped_slot(&self, binding_id: u64) -> CacheSlot {
        self.inner
            .scoped
            .lock()
            .entry(binding_id)
            .or_default()
            .clone()
    }

    /// Drops this context's cached value of a binding that left the registry.
    fn forget_scoped(&self, binding_id: u64) {
        self.inner.scoped.lock().remove(&binding_id);
    }

    #[cfg(test)]
    fn scoped_len(&self) -> usize {
        self.inner.scoped.lock().len()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.read();
        f.debug_struct("Context")
            .field("name", &self.inner.name)
            .field("keys", &registry.order)
            .finish()
    }
}

impl FromBoundValue for Context {
    fn from_bound_value(value: BoundValue) -> Option<Self> {
        value.downcast_ref::<Context>().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingScope;

    #[test]
    fn test_bind_and_get_sync() {
        let ctx = Context::named("app");
        ctx.bind("foo").unwrap().to("bar").unwrap();
        let value: String = ctx.get_sync_as("foo").unwrap();
        assert_eq!(value, "bar");
    }

    #[test]
    fn test_bind_returns_pending_binding() {
        let ctx = Context::new();
        let first = ctx.bind("foo").unwrap();
        let second = ctx.bind("foo").unwrap();
        assert!(first.same_as(&second));
    }

    #[test]
    fn test_bind_replaces_configured_binding() {
        let ctx = Context::new();
        let first = ctx.bind("foo").unwrap().to(1u8).unwrap();
        let second = ctx.bind("foo").unwrap().to(2u8).unwrap();
        assert!(!first.same_as(&second));
        assert_eq!(ctx.get_sync_as::<u8>("foo").unwrap(), 2);
    }

    #[test]
    fn test_bind_rejects_locked_key() {
        let ctx = Context::new();
        ctx.bind("foo").unwrap().to(1u8).unwrap().lock();
        assert!(matches!(ctx.bind("foo"), Err(Error::DuplicateBinding { key }) if key == "foo"));
    }

    #[test]
    fn test_unbind() {
        let ctx = Context::new();
        ctx.bind("a").unwrap().to(1u8).unwrap();
        ctx.bind("b").unwrap().to(1u8).unwrap().lock();
        assert!(ctx.unbind("a").unwrap());
        assert!(!ctx.unbind("a").unwrap());
        assert!(matches!(ctx.unbind("b"), Err(Error::BindingLocked { .. })));
        assert!(ctx.contains("b"));
    }

    #[test]
    fn test_missing_key_names_context() {
        let ctx = Context::named("request");
        let err = ctx.get_sync("nope").unwrap_err();
        assert!(matches!(
            err,
            Error::BindingNotFound { key, context } if key == "nope" && context == "request"
        ));
    }

    #[test]
    fn test_child_sees_parent_bindings() {
        let parent = Context::named("parent");
        parent.bind("foo").unwrap().to("parent").unwrap();
        let child = parent.create_child();
        assert!(child.is_bound("foo"));
        assert!(!child.contains("foo"));
        assert!(child.owner_context("foo").unwrap().same_as(&parent));
    }

    #[test]
    fn test_dropped_parent_is_treated_as_absent() {
        let child = {
            let parent = Context::named("parent");
            parent.bind("foo").unwrap().to(1u8).unwrap();
            parent.create_child()
        };
        assert!(child.parent().is_none());
        assert!(!child.is_bound("foo"));
    }

    #[test]
    fn test_find_keeps_registration_order() {
        let ctx = Context::new();
        for key in ["servers.b", "servers.a", "other"] {
            ctx.bind(key).unwrap().to(0u8).unwrap();
        }
        let keys: Vec<String> = ctx
            .find("servers.*")
            .iter()
            .map(|b| b.key().to_string())
            .collect();
        assert_eq!(keys, vec!["servers.b", "servers.a"]);
    }

    #[test]
    fn test_find_hides_shadowed_parent_bindings() {
        let parent = Context::new();
        parent.bind("a").unwrap().to(1u8).unwrap().tag("t").unwrap();
        parent.bind("b").unwrap().to(1u8).unwrap().tag("t").unwrap();
        let child = parent.create_child();
        // Shadows `a` without the tag.
        child.bind("a").unwrap().to(2u8).unwrap();
        let keys: Vec<String> = child
            .find_by_tag("t")
            .iter()
            .map(|b| b.key().to_string())
            .collect();
        assert_eq!(keys, vec!["b"]);
    }

    #[test]
    fn test_key_with_path() {
        let ctx = Context::new();
        ctx.bind("app.config")
            .unwrap()
            .to(serde_json::json!({"rest": {"port": 3000}}))
            .unwrap();
        let port: u16 = ctx.get_sync_as("app.config#rest.port").unwrap();
        assert_eq!(port, 3000);
        assert!(ctx.get_sync("app.config#rest.host").unwrap().is_undefined());
    }

    #[test]
    fn test_get_value_or_default() {
        let ctx = Context::new();
        ctx.bind("set").unwrap().to(1u8).unwrap();
        let fallback = |key: &str| {
            ctx.get_value_or_default(key, BoundValue::new(9u8), None)
                .into_sync(key)
                .unwrap()
                .extract::<u8>(key)
                .unwrap()
        };
        assert_eq!(fallback("set"), 1);
        assert_eq!(fallback("unset"), 9);
    }

    #[test]
    fn test_context_scope_caches_per_context() {
        let parent = Context::new();
        parent
            .bind("counter")
            .unwrap()
            .to_dynamic_value(|| ValueOrFuture::ready(Ulid::new().to_string()))
            .unwrap()
            .in_scope(BindingScope::Context)
            .unwrap();
        let child = parent.create_child();
        let p1: String = parent.get_sync_as("counter").unwrap();
        let p2: String = parent.get_sync_as("counter").unwrap();
        let c1: String = child.get_sync_as("counter").unwrap();
        let c2: String = child.get_sync_as("counter").unwrap();
        assert_eq!(p1, p2);
        assert_eq!(c1, c2);
        assert_ne!(p1, c1);
    }

    #[test]
    fn test_context_scoped_values_pruned_with_binding() {
        let ctx = Context::new();
        let scoped = |ctx: &Context, key: &str| {
            ctx.bind(key)
                .unwrap()
                .to_dynamic_value(|| ValueOrFuture::ready(String::from("v")))
                .unwrap()
                .in_scope(BindingScope::Context)
                .unwrap();
        };
        scoped(&ctx, "a");
        scoped(&ctx, "b");
        ctx.get_sync("a").unwrap();
        ctx.get_sync("b").unwrap();
        assert_eq!(ctx.scoped_len(), 2);

        ctx.unbind("a").unwrap();
        assert_eq!(ctx.scoped_len(), 1);

        // Replacing a binding forgets the old one's value
        scoped(&ctx, "b");
        assert_eq!(ctx.scoped_len(), 0);
        ctx.get_sync("b").unwrap();
        assert_eq!(ctx.scoped_len(), 1);
    }
}
