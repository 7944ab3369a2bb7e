//! bindery - binding/context dependency injection runtime
//!
//! Values are registered in a hierarchy of [`Context`]s under string keys.
//! Each [`Binding`] knows how to produce its value (a constant, a factory, a
//! class instantiated with injected dependencies, or a provider) and how long
//! to reuse it ([`BindingScope`]). Resolution stays synchronous until a
//! dependency is asynchronous, and detects circular dependencies.

// Lets code generated by `#[derive(Injectable)]` name this crate as `::bindery`
extern crate self as bindery;

pub mod application;
pub mod authentication;
pub mod binding;
pub mod cli;
pub mod config;
pub mod context;
pub mod di;
pub mod error;
pub mod extension_point;
pub mod inject;
pub mod instantiator;
pub mod pattern;
pub mod resolution;
pub mod session;
pub mod value;

pub use application::{Application, Component, Registration, Server};
pub use binding::{Binding, BindingScope, BindingType};
pub use context::Context;
pub use di::{Injectable, Provider};
pub use error::{DeclarationError, Error, Result};
pub use extension_point::ExtensionPoint;
pub use inject::{Declarations, Getter, Injection, InjectionSpec, Setter};
pub use instantiator::{instantiate_class, resolve_injected_arguments, Arguments};
pub use pattern::Pattern;
pub use resolution::ValueOrFuture;
pub use session::ResolutionSession;
pub use value::{BoundValue, FromBoundValue};
