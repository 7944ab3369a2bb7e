//! Instantiation of injectable classes.
//!
//! Constructor arguments are resolved concurrently and handed to
//! [`Injectable::construct`] in declaration order. Property injections are
//! resolved next and assigned one by one. Everything stays synchronous when
//! every dependency is synchronous.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::di::{Injectable, Provider};
use crate::error::Result;
use crate::inject::{Injection, MetadataRegistry, TypeInjections};
use crate::resolution::ValueOrFuture;
use crate::session::ResolutionSession;
use crate::value::{BoundValue, FromBoundValue};

// ============================================================================
// Arguments
// ============================================================================

/// Resolved arguments for a constructor or method.
pub struct Arguments {
    target: &'static str,
    injections: Vec<Arc<Injection>>,
    values: Vec<BoundValue>,
}

impl Arguments {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The raw value at `index`; undefined past the end.
    pub fn get(&self, index: usize) -> BoundValue {
        self.values.get(index).cloned().unwrap_or_default()
    }

    /// Takes the value at `index` and converts it.
    pub fn take<T: FromBoundValue>(&mut self, index: usize) -> Result<T> {
        let value = self
            .values
            .get_mut(index)
            .map(std::mem::take)
            .unwrap_or_default();
        let name = match self.injections.get(index) {
            Some(injection) => format!("{} ({})", injection.describe(), injection.binding_key),
            None => format!("{}.constructor[{index}]", self.target),
        };
        value.extract(&name)
    }

    pub fn injections(&self) -> &[Arc<Injection>] {
        &self.injections
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("target", &self.target)
            .field("values", &self.values)
            .finish()
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolves one injection: custom resolver if any, else the binding key.
pub fn resolve_injection(
    ctx: &Context,
    injection: &Arc<Injection>,
    session: &ResolutionSession,
) -> ValueOrFuture<BoundValue> {
    let session = session.enter_injection(injection.clone());
    match &injection.resolve {
        Some(resolve) => resolve(ctx, injection.as_ref(), &session),
        None => ctx.get_value_or_future(&injection.binding_key, Some(&session)),
    }
}

fn resolve_arguments(
    declared: &TypeInjections,
    method: Option<&str>,
    ctx: &Context,
    session: &ResolutionSession,
) -> ValueOrFuture<Arguments> {
    let injections = declared.arguments(method).to_vec();
    let values = injections
        .iter()
        .map(|injection| resolve_injection(ctx, injection, session))
        .collect();
    let target = declared.target();
    ValueOrFuture::join_all(values).map(move |values| Arguments {
        target,
        injections,
        values,
    })
}

/// Resolves the injected arguments of `T`'s constructor (`None`) or of a
/// method, so the caller can invoke it.
pub fn resolve_injected_arguments<T: Injectable>(
    method: Option<&str>,
    ctx: &Context,
    session: Option<&ResolutionSession>,
) -> ValueOrFuture<Arguments> {
    let declared = match MetadataRegistry::global().ensure_declared::<T>() {
        Ok(declared) => declared,
        Err(err) => return ValueOrFuture::err(err.into()),
    };
    let session = session.cloned().unwrap_or_default();
    resolve_arguments(&declared, method, ctx, &session)
}

/// Creates an instance of `T` with its dependencies injected.
pub fn instantiate_class<T: Injectable>(
    ctx: &Context,
    session: Option<&ResolutionSession>,
) -> ValueOrFuture<T> {
    let declared = match MetadataRegistry::global().ensure_declared::<T>() {
        Ok(declared) => declared,
        Err(err) => return ValueOrFuture::err(err.into()),
    };
    let session = session.cloned().unwrap_or_default();
    tracing::trace!(target_type = declared.target(), "instantiating class");

    let ctx = ctx.clone();
    resolve_arguments(&declared, None, &ctx, &session).and_then(move |args| {
        match T::construct(args) {
            Ok(instance) => inject_properties(instance, &declared, &ctx, &session),
            Err(err) => ValueOrFuture::err(err),
        }
    })
}

fn inject_properties<T: Injectable>(
    mut instance: T,
    declared: &TypeInjections,
    ctx: &Context,
    session: &ResolutionSession,
) -> ValueOrFuture<T> {
    let properties = declared.properties();
    if properties.is_empty() {
        return ValueOrFuture::ready(instance);
    }

    let names: Vec<String> = properties
        .iter()
        .map(|p| p.member.clone().unwrap_or_default())
        .collect();
    let values = properties
        .iter()
        .map(|injection| resolve_injection(ctx, injection, session))
        .collect();

    ValueOrFuture::join_all(values).and_then(move |values| {
        for (name, value) in names.iter().zip(values) {
            if let Err(err) = instance.inject_property(name, value) {
                return ValueOrFuture::err(err);
            }
        }
        ValueOrFuture::ready(instance)
    })
}

// ============================================================================
// Constructors
// ============================================================================

type BuildFn = Arc<dyn Fn(&Context, &ResolutionSession) -> ValueOrFuture<BoundValue> + Send + Sync>;

/// Type-erased recipe for class and provider bindings.
#[derive(Clone)]
pub struct Constructor {
    type_name: &'static str,
    build: BuildFn,
}

impl Constructor {
    pub(crate) fn class<T, U>(convert: fn(T) -> U) -> Self
    where
        T: Injectable,
        U: Any + Send + Sync,
    {
        Self {
            type_name: std::any::type_name::<T>(),
            build: Arc::new(move |ctx: &Context, session: &ResolutionSession| {
                instantiate_class::<T>(ctx, Some(session)).map(move |instance| {
                    BoundValue::new(convert(instance))
                })
            }),
        }
    }

    pub(crate) fn provider<P: Provider>() -> Self {
        Self {
            type_name: std::any::type_name::<P>(),
            build: Arc::new(|ctx: &Context, session: &ResolutionSession| {
                instantiate_class::<P>(ctx, Some(session))
                    .and_then(|provider| provider.value().map(BoundValue::new))
            }),
        }
    }

    /// Name of the class or provider type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn build(&self, ctx: &Context, session: &ResolutionSession) -> ValueOrFuture<BoundValue> {
        (self.build)(ctx, session)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constructor({})", self.type_name)
    }
}
