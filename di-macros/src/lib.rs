//! Derive macros declaring injection points for bindery.
//!
//! This crate provides `#[derive(Injectable)]`, which implements
//! `bindery::Injectable` from `#[inject(..)]` field attributes.
//!
//! Generated code references the runtime through `::bindery::` paths.

use proc_macro::TokenStream;

mod attrs;
mod injectable;

/// Derive macro for types the container can construct.
///
/// Fields marked `#[inject(..)]` are injected; every other field is
/// initialized with `Default::default()`. Injected fields are constructor
/// parameters numbered in field order, unless marked `property`, in which
/// case they are assigned after construction.
///
/// # Attribute forms
///
/// | attribute                        | injects                                 |
/// |----------------------------------|-----------------------------------------|
/// | `#[inject("key")]`               | value bound to `key` (`key#path` works) |
/// | `#[inject(key = "key")]`         | same as above                           |
/// | `#[inject(getter = "key")]`      | a `Getter` resolving `key` on demand    |
/// | `#[inject(setter = "key")]`      | a `Setter` binding `key`                |
/// | `#[inject(options)]`             | the current binding's options           |
/// | `#[inject(options = "a.b")]`     | one property of those options           |
/// | `#[inject(tag = "pattern")]`     | values of all bindings tagged `pattern` |
/// | `#[inject(tag_regex = "^re")]`   | same, with a regular expression         |
///
/// Add `property` to any form except `getter` and `setter`, e.g.
/// `#[inject("key", property)]`.
///
/// # Example
///
/// ```ignore
/// use bindery::{Getter, Injectable};
///
/// #[derive(Injectable)]
/// pub struct InfoController {
///     #[inject("application.name")]
///     app_name: String,
///     #[inject(getter = "current.user")]
///     user: Getter,
///     #[inject(tag = "plugin", property)]
///     plugins: Vec<Arc<String>>,
///     hits: u64,
/// }
///
/// // Generated implementation (abridged):
/// // impl bindery::Injectable for InfoController {
/// //     fn declare(decl) { decl.parameter(0, inject::key("application.name"))?; ... }
/// //     fn construct(mut args) { Ok(Self { app_name: args.take(0)?, user: args.take(1)?, ... }) }
/// //     fn inject_property(&mut self, name, value) { match name { "plugins" => ... } }
/// // }
/// ```
#[proc_macro_derive(Injectable, attributes(inject))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    injectable::derive_injectable_impl(input)
}
