//! Implementation of #[derive(Injectable)] proc-macro.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

use crate::attrs;

pub fn derive_injectable_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields.named.iter().collect::<Vec<_>>(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Injectable can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Injectable can only be derived for structs",
            ));
        }
    };

    let mut declarations = Vec::new();
    let mut initializers = Vec::new();
    let mut property_arms = Vec::new();
    let mut index = 0usize;

    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        match attrs::parse_field(field)? {
            // Constructor parameters, in field order
            Some(injection) if !injection.property => {
                let spec = injection.spec_tokens();
                declarations.push(quote! { decl.parameter(#index, #spec)?; });
                initializers.push(quote! { #ident: args.take(#index)? });
                index += 1;
            }
            // Properties, assigned after construction
            Some(injection) => {
                let spec = injection.spec_tokens();
                let property = ident.to_string();
                let described = format!("{name}.{property}");
                let ty = &field.ty;
                declarations.push(quote! { decl.property(#property, #spec)?; });
                initializers.push(quote! { #ident: ::std::default::Default::default() });
                property_arms.push(quote! {
                    #property => {
                        self.#ident = value.extract::<#ty>(#described)?;
                        ::std::result::Result::Ok(())
                    }
                });
            }
            None => {
                initializers.push(quote! { #ident: ::std::default::Default::default() });
            }
        }
    }

    let construct_body = if matches!(&input.data, Data::Struct(data) if matches!(data.fields, Fields::Unit)) {
        quote! { Self }
    } else {
        quote! { Self { #(#initializers),* } }
    };

    let inject_property = if property_arms.is_empty() {
        quote! {}
    } else {
        quote! {
            fn inject_property(
                &mut self,
                name: &str,
                value: ::bindery::BoundValue,
            ) -> ::bindery::Result<()> {
                match name {
                    #(#property_arms)*
                    _ => ::std::result::Result::Err(::bindery::Error::UnknownProperty {
                        target: ::std::any::type_name::<Self>(),
                        property: name.to_string(),
                    }),
                }
            }
        }
    };

    Ok(quote! {
        impl #impl_generics ::bindery::Injectable for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn declare(
                decl: &mut ::bindery::Declarations,
            ) -> ::std::result::Result<(), ::bindery::DeclarationError> {
                #(#declarations)*
                ::std::result::Result::Ok(())
            }

            #[allow(unused_mut, unused_variables)]
            fn construct(mut args: ::bindery::Arguments) -> ::bindery::Result<Self> {
                ::std::result::Result::Ok(#construct_body)
            }

            #inject_property
        }
    })
}
