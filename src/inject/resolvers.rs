//! Resolvers for getter, setter, options and tag injections.

use std::any::Any;

use crate::context::Context;
use crate::error::Result;
use crate::pattern::Pattern;
use crate::resolution::ValueOrFuture;
use crate::session::ResolutionSession;
use crate::value::{json_path, BoundValue, FromBoundValue};

use super::Injection;

/// Deferred access to a binding.
///
/// Resolves its key against the context it was injected from, each time it
/// is called. The resolution path of the injection travels with the getter:
/// calling it back into a binding that is still being constructed fails with
/// a circular dependency, while bindings whose values are already cached
/// resolve normally.
#[derive(Clone)]
pub struct Getter {
    context: Context,
    key: String,
    session: ResolutionSession,
}

impl Getter {
    pub fn new(context: Context, key: impl Into<String>) -> Self {
        Self {
            context,
            key: key.into(),
            session: ResolutionSession::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn get(&self) -> Result<BoundValue> {
        self.context
            .get_value_or_future(&self.key, Some(&self.session))
            .into_future()
            .await
    }

    pub async fn get_as<T: FromBoundValue>(&self) -> Result<T> {
        self.get().await?.extract(&self.key)
    }

    /// Resolves synchronously; fails if the chain is asynchronous.
    pub fn get_sync(&self) -> Result<BoundValue> {
        self.context
            .get_value_or_future(&self.key, Some(&self.session))
            .into_sync(&self.key)
    }
}

impl FromBoundValue for Getter {
    fn from_bound_value(value: BoundValue) -> Option<Self> {
        value.downcast_ref::<Getter>().cloned()
    }
}

/// Binds a key in the context it was injected from.
#[derive(Clone)]
pub struct Setter {
    context: Context,
    key: String,
}

impl Setter {
    pub fn new(context: Context, key: impl Into<String>) -> Self {
        Self {
            context,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Binds the key to a constant value.
    pub fn set<T: Any + Send + Sync>(&self, value: T) -> Result<()> {
        self.context.bind(self.key.clone())?.to(value)?;
        Ok(())
    }
}

impl FromBoundValue for Setter {
    fn from_bound_value(value: BoundValue) -> Option<Self> {
        value.downcast_ref::<Setter>().cloned()
    }
}

pub(super) fn resolve_as_getter(
    ctx: &Context,
    injection: &Injection,
    session: &ResolutionSession,
) -> ValueOrFuture<BoundValue> {
    ValueOrFuture::ready(BoundValue::new(Getter {
        context: ctx.clone(),
        key: injection.binding_key.clone(),
        session: session.fork(),
    }))
}

pub(super) fn resolve_as_setter(
    ctx: &Context,
    injection: &Injection,
    _session: &ResolutionSession,
) -> ValueOrFuture<BoundValue> {
    ValueOrFuture::ready(BoundValue::new(Setter::new(
        ctx.clone(),
        injection.binding_key.clone(),
    )))
}

/// Looks up the injection's path in the options of the current binding.
pub(super) fn resolve_from_options(
    _ctx: &Context,
    injection: &Injection,
    session: &ResolutionSession,
) -> ValueOrFuture<BoundValue> {
    let Some(binding) = session.current_binding() else {
        return ValueOrFuture::ready(BoundValue::undefined());
    };
    let path = injection
        .binding_key
        .strip_prefix('#')
        .unwrap_or(&injection.binding_key)
        .replace('#', ".");
    binding.options().map(move |options| {
        json_path(&options, &path)
            .cloned()
            .map(BoundValue::json)
            .unwrap_or_default()
    })
}

/// Resolves every visible binding with a matching tag, concurrently.
pub(super) fn resolve_by_tag(
    ctx: &Context,
    pattern: &Pattern,
    session: &ResolutionSession,
) -> ValueOrFuture<BoundValue> {
    let values = ctx
        .find_by_tag(pattern.clone())
        .iter()
        .map(|binding| binding.get_value(ctx, Some(session)))
        .collect();
    ValueOrFuture::join_all(values).map(BoundValue::new)
}
