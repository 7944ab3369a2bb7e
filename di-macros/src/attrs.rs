//! Parsing of `#[inject(..)]` field attributes.

use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Field, Ident, LitStr, Token};

/// One comma-separated argument: `"key"`, `name` or `name = "value"`.
enum InjectArg {
    Key(LitStr),
    Named { name: Ident, value: Option<LitStr> },
}

impl Parse for InjectArg {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(LitStr) {
            return Ok(Self::Key(input.parse()?));
        }
        let name: Ident = input.parse()?;
        let value = if input.peek(Token![=]) {
            input.parse::<Token![=]>()?;
            Some(input.parse()?)
        } else {
            None
        };
        Ok(Self::Named { name, value })
    }
}

/// What a field receives.
pub enum InjectKind {
    Key(LitStr),
    Getter(LitStr),
    Setter(LitStr),
    Options(LitStr),
    Tag(LitStr),
    TagRegex(LitStr),
}

/// A parsed `#[inject(..)]` attribute.
pub struct FieldInjection {
    pub kind: InjectKind,
    /// Assigned after construction instead of passed to the constructor.
    pub property: bool,
}

impl FieldInjection {
    /// Expression building the `InjectionSpec`.
    pub fn spec_tokens(&self) -> TokenStream2 {
        match &self.kind {
            InjectKind::Key(key) => quote! { ::bindery::inject::key(#key) },
            InjectKind::Getter(key) => quote! { ::bindery::inject::getter(#key) },
            InjectKind::Setter(key) => quote! { ::bindery::inject::setter(#key) },
            InjectKind::Options(path) => quote! { ::bindery::inject::options(#path) },
            InjectKind::Tag(tag) => quote! { ::bindery::inject::tag(#tag) },
            InjectKind::TagRegex(re) => quote! { ::bindery::inject::tag_regex(#re)? },
        }
    }
}

/// Parses the `#[inject]` attribute of a field, if it has one.
pub fn parse_field(field: &Field) -> syn::Result<Option<FieldInjection>> {
    let mut found = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("inject") {
            continue;
        }
        if found.is_some() {
            return Err(syn::Error::new_spanned(attr, "duplicate #[inject] attribute"));
        }
        let args = attr.parse_args_with(Punctuated::<InjectArg, Token![,]>::parse_terminated)?;
        found = Some(from_args(args, attr.path().segments[0].ident.span())?);
    }
    Ok(found)
}

fn from_args(
    args: Punctuated<InjectArg, Token![,]>,
    span: Span,
) -> syn::Result<FieldInjection> {
    let mut kind = None;
    let mut property = false;

    for arg in args {
        let next = match arg {
            InjectArg::Key(key) => InjectKind::Key(key),
            InjectArg::Named { name, value } => match (name.to_string().as_str(), value) {
                ("property", None) => {
                    property = true;
                    continue;
                }
                ("key", Some(v)) => InjectKind::Key(v),
                ("getter", Some(v)) => InjectKind::Getter(v),
                ("setter", Some(v)) => InjectKind::Setter(v),
                ("options", Some(v)) => InjectKind::Options(v),
                ("options", None) => InjectKind::Options(LitStr::new("", name.span())),
                ("tag", Some(v)) => InjectKind::Tag(v),
                ("tag_regex", Some(v)) => InjectKind::TagRegex(v),
                ("property", Some(v)) => {
                    return Err(syn::Error::new_spanned(v, "`property` takes no value"));
                }
                (_, _) => {
                    return Err(syn::Error::new_spanned(
                        name,
                        "expected a key string, `key`, `getter`, `setter`, `options`, `tag`, `tag_regex` or `property`",
                    ));
                }
            },
        };
        if kind.replace(next).is_some() {
            return Err(syn::Error::new(span, "#[inject] accepts a single injection source"));
        }
    }

    let kind = kind.ok_or_else(|| syn::Error::new(span, "#[inject] requires an injection source"))?;
    // Property fields start from `Default`, which getters and setters lack
    if property {
        if let InjectKind::Getter(key) | InjectKind::Setter(key) = &kind {
            return Err(syn::Error::new_spanned(
                key,
                "getters and setters are constructor injections and cannot be marked `property`",
            ));
        }
    }
    Ok(FieldInjection { kind, property })
}
