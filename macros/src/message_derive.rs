//! `#[derive(Message)]`: implement `Message`, with ancestors taken from
//! fields marked `#[message(ancestor)]`.

use proc_macro2::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Attribute, Data, DeriveInput, Error, Fields, LitStr, Member, Result};

/// Container-level options.
#[derive(Debug, Default)]
pub(crate) struct MessageOptions {
    pub name: Option<LitStr>,
}

fn parse_options(attrs: &[Attribute]) -> Result<MessageOptions> {
    let mut options = MessageOptions::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("message")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                options.name = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unknown message option; expected `name = \"...\"`"))
            }
        })?;
    }
    Ok(options)
}

fn is_ancestor(attr: &Attribute) -> Result<bool> {
    if !attr.path().is_ident("message") {
        return Ok(false);
    }
    let mut ancestor = false;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("ancestor") {
            ancestor = true;
            Ok(())
        } else {
            Err(meta.error("unknown field option; expected `ancestor`"))
        }
    })?;
    Ok(ancestor)
}

/// Fields marked `#[message(ancestor)]`, in declaration order.
pub(crate) fn ancestor_fields(input: &DeriveInput) -> Result<Vec<Member>> {
    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        Data::Enum(data) => {
            for variant in &data.variants {
                for field in &variant.fields {
                    for attr in &field.attrs {
                        if is_ancestor(attr)? {
                            return Err(Error::new(
                                attr.span(),
                                "ancestors are only supported on struct fields",
                            ));
                        }
                    }
                }
            }
            return Ok(Vec::new());
        }
        Data::Union(data) => {
            return Err(Error::new(
                data.union_token.span(),
                "Message cannot be derived for unions",
            ));
        }
    };

    let mut members = Vec::new();
    for (index, field) in fields.iter().enumerate() {
        let mut marked = false;
        for attr in &field.attrs {
            marked |= is_ancestor(attr)?;
        }
        if !marked {
            continue;
        }
        let member = match (&field.ident, fields) {
            (Some(ident), Fields::Named(_)) => Member::Named(ident.clone()),
            _ => Member::Unnamed(index.into()),
        };
        members.push(member);
    }
    Ok(members)
}

/// Entry point for the derive.
pub(crate) fn derive_message_impl(input: TokenStream) -> Result<TokenStream> {
    let input: DeriveInput = syn::parse2(input)?;
    let options = parse_options(&input.attrs)?;
    let members = ancestor_fields(&input)?;

    let ident = &input.ident;
    let name = options
        .name
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let ancestors_fn = if members.is_empty() {
        quote! {}
    } else {
        quote! {
            fn ancestors(&self) -> ::std::vec::Vec<::mvvm_mediator::Ancestor<'_>> {
                let mut out = ::std::vec::Vec::new();
                #( out.extend(::mvvm_mediator::Ancestor::chain(&self.#members)); )*
                out
            }
        }
    };

    Ok(quote! {
        impl #impl_generics ::mvvm_mediator::Message for #ident #ty_generics #where_clause {
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn message_name(&self) -> &str {
                #name
            }

            #ancestors_fn
        }
    })
}

// ===========================================================================
// Tests
// ===========================================================================
