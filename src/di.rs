//! Dependency injection infrastructure.
//!
//! This module provides the traits classes implement to take part in
//! injection, and re-exports the derive macro from `di-macros`.
//!
//! # Overview
//!
//! - [`Injectable`]: declares injection points and builds an instance from
//!   resolved constructor arguments
//! - [`Provider`]: an injectable type whose `value()` is what gets bound
//! - `#[derive(Injectable)]`: generates both from `#[inject(..)]` field attributes
//!
//! # Example
//!
//! ```ignore
//! use bindery::{inject, Injectable};
//!
//! #[derive(Injectable)]
//! pub struct Greeter {
//!     #[inject("greeting")]
//!     greeting: String,
//!     #[inject(getter = "user")]
//!     user: Getter,
//!     #[inject(options = "lang", property)]
//!     lang: Option<String>,
//! }
//!
//! // Usage
//! ctx.bind("greeter")?.to_class::<Greeter>()?;
//! let greeter: Arc<Greeter> = ctx.get_as("greeter").await?;
//! ```

use std::any::{type_name, Any};

use crate::error::{DeclarationError, Error, Result};
use crate::inject::Declarations;
use crate::instantiator::Arguments;
use crate::resolution::ValueOrFuture;
use crate::value::BoundValue;

/// A type the container can construct.
///
/// `declare` runs once per type, the first time the type is bound or
/// instantiated. `construct` receives the resolved constructor arguments in
/// declaration order. Property injections are assigned afterwards, one
/// `inject_property` call per declared property.
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Declares constructor-parameter and property injections.
    fn declare(_decl: &mut Declarations) -> Result<(), DeclarationError> {
        Ok(())
    }

    /// Builds an instance from resolved constructor arguments.
    fn construct(args: Arguments) -> Result<Self>;

    /// Assigns a resolved property injection.
    fn inject_property(&mut self, name: &str, _value: BoundValue) -> Result<()> {
        Err(Error::UnknownProperty {
            target: type_name::<Self>(),
            property: name.to_string(),
        })
    }
}

/// An injectable factory for a bound value.
///
/// The provider itself is instantiated with injection on every uncached
/// resolution; the value it returns is what the binding hands out.
pub trait Provider: Injectable {
    type Value: Any + Send + Sync;

    fn value(&self) -> ValueOrFuture<Self::Value>;
}

// Re-export derive macro
pub use di_macros::Injectable;
