//! `#[message_handlers]`: collect `#[handles]` methods of an impl block into a
//! `Recipient` implementation.

use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Attribute, Error, Expr, ExprLit, FnArg, Ident, ImplItem, ImplItemFn, ItemImpl, Lit, LitStr,
    Member, Meta, Result, Token, Type,
};

// ---------------------------------------------------------------------------
// AST types
// ---------------------------------------------------------------------------

/// Arguments of `#[message_handlers(...)]`.
#[derive(Debug, Default)]
pub(crate) struct HandlersArgs {
    /// Fields whose recipient handlers are inherited: `inherit(base, 0)`.
    pub inherit: Vec<Member>,
}

/// Arguments of one `#[handles]` attribute.
#[derive(Debug, Default)]
pub(crate) struct HandlesArgs {
    pub key: Option<LitStr>,
}

/// How a handler method is called.
#[derive(Debug)]
pub(crate) enum Shape {
    /// `fn(&self)` or `fn()`.
    Unit,
    /// `fn(&self, &P)` or `fn(&P)`.
    Payload(Type),
    /// More than one payload parameter.
    Unsupported(usize),
}

/// A method marked `#[handles]`.
#[derive(Debug)]
pub(crate) struct Handler {
    pub method: Ident,
    pub key: Option<LitStr>,
    pub has_receiver: bool,
    pub shape: Shape,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl Parse for HandlersArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut args = HandlersArgs::default();
        while !input.is_empty() {
            let name: Ident = input.parse()?;
            if name != "inherit" {
                return Err(Error::new(
                    name.span(),
                    format!("unknown argument `{}`; expected `inherit(...)`", name),
                ));
            }
            let content;
            syn::parenthesized!(content in input);
            let fields = Punctuated::<Member, Token![,]>::parse_terminated(&content)?;
            args.inherit.extend(fields);
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(args)
    }
}

impl Parse for HandlesArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        if input.is_empty() {
            return Ok(HandlesArgs::default());
        }
        let key = if input.peek(LitStr) {
            input.parse::<LitStr>()?
        } else {
            let name: Ident = input.parse()?;
            if name != "key" {
                return Err(Error::new(
                    name.span(),
                    format!("unknown argument `{}`; expected `key = \"...\"`", name),
                ));
            }
            input.parse::<Token![=]>()?;
            input.parse::<LitStr>()?
        };
        if !input.is_empty() {
            return Err(input.error("unexpected tokens after handler key"));
        }
        Ok(HandlesArgs { key: Some(key) })
    }
}

fn is_handles(attr: &Attribute) -> bool {
    attr.path().is_ident("handles")
}

/// Parse the `#[handles]` attribute, in any of its three forms.
fn parse_handles(attr: &Attribute) -> Result<HandlesArgs> {
    let args = match &attr.meta {
        Meta::Path(_) => HandlesArgs::default(),
        Meta::List(_) => attr.parse_args::<HandlesArgs>()?,
        Meta::NameValue(nv) => match &nv.value {
            Expr::Lit(ExprLit {
                lit: Lit::Str(key), ..
            }) => HandlesArgs {
                key: Some(key.clone()),
            },
            other => return Err(Error::new(other.span(), "expected a string literal key")),
        },
    };
    if let Some(key) = &args.key {
        if key.value().is_empty() {
            return Err(Error::new(key.span(), "handler key must not be empty"));
        }
    }
    Ok(args)
}

/// Inspect a `#[handles]` method's signature.
pub(crate) fn parse_handler(method: &ImplItemFn, args: HandlesArgs) -> Result<Handler> {
    let sig = &method.sig;
    if let Some(asyncness) = &sig.asyncness {
        return Err(Error::new(asyncness.span(), "handlers cannot be async"));
    }
    if !sig.generics.params.is_empty() {
        return Err(Error::new(sig.generics.span(), "handlers cannot be generic"));
    }

    let mut has_receiver = false;
    let mut params = Vec::new();
    for input in &sig.inputs {
        match input {
            FnArg::Receiver(receiver) => {
                if receiver.reference.is_none() || receiver.mutability.is_some() {
                    return Err(Error::new(
                        receiver.span(),
                        "handlers take `&self`; the mediator holds recipients behind `Arc`",
                    ));
                }
                has_receiver = true;
            }
            FnArg::Typed(pat) => params.push(&*pat.ty),
        }
    }

    let shape = match params.as_slice() {
        [] => Shape::Unit,
        [Type::Reference(reference)] if reference.mutability.is_none() => {
            Shape::Payload((*reference.elem).clone())
        }
        [other] => {
            return Err(Error::new(
                other.span(),
                "handler payloads are taken by shared reference, e.g. `&Order`",
            ));
        }
        many => Shape::Unsupported(many.len()),
    };

    Ok(Handler {
        method: sig.ident.clone(),
        key: args.key,
        has_receiver,
        shape,
    })
}

// ---------------------------------------------------------------------------
// Code generation
// ---------------------------------------------------------------------------

fn generate_descriptor(handler: &Handler) -> TokenStream {
    let method = &handler.method;
    let name = method.to_string();
    let key = match &handler.key {
        Some(key) => quote! { ::std::option::Option::Some(#key) },
        None => quote! { ::std::option::Option::None },
    };
    let descriptor = quote! { ::mvvm_mediator::HandlerDescriptor::<Self> };

    match (&handler.shape, handler.has_receiver) {
        (Shape::Unit, true) => quote_spanned! {method.span()=>
            #descriptor::unit(#name, #key, |this: &Self| Self::#method(this))
        },
        (Shape::Unit, false) => quote_spanned! {method.span()=>
            #descriptor::free_unit(#name, #key, || Self::#method())
        },
        // Unkeyed payloads are dispatched by type and must be `Message`s;
        // keyed ones accept any payload type.
        (Shape::Payload(ty), true) => match &handler.key {
            Some(lit) => quote_spanned! {method.span()=>
                #descriptor::payload_named::<#ty, _, _>(#name, #lit, |this: &Self, payload: &#ty| {
                    Self::#method(this, payload)
                })
            },
            None => quote_spanned! {method.span()=>
                #descriptor::payload::<#ty, _, _>(#name, #key, |this: &Self, payload: &#ty| {
                    Self::#method(this, payload)
                })
            },
        },
        (Shape::Payload(ty), false) => match &handler.key {
            Some(lit) => quote_spanned! {method.span()=>
                #descriptor::free_payload_named::<#ty, _, _>(#name, #lit, |payload: &#ty| {
                    Self::#method(payload)
                })
            },
            None => quote_spanned! {method.span()=>
                #descriptor::free_payload::<#ty, _, _>(#name, #key, |payload: &#ty| {
                    Self::#method(payload)
                })
            },
        },
        (Shape::Unsupported(count), _) => quote! {
            #descriptor::unsupported(#name, #count)
        },
    }
}

/// Entry point: rewrite the impl block and append the `Recipient` impl.
pub(crate) fn message_handlers_impl(args: TokenStream, item: TokenStream) -> Result<TokenStream> {
    let args: HandlersArgs = syn::parse2(args)?;
    let mut block: ItemImpl = syn::parse2(item)?;

    if let Some((_, path, _)) = &block.trait_ {
        return Err(Error::new(
            path.span(),
            "#[message_handlers] goes on an inherent impl block",
        ));
    }

    let mut handlers = Vec::new();
    for item in &mut block.items {
        let ImplItem::Fn(method) = item else { continue };
        let mut marks = method.attrs.iter().filter(|attr| is_handles(attr));
        let Some(attr) = marks.next() else { continue };
        if let Some(extra) = marks.next() {
            return Err(Error::new(extra.span(), "duplicate #[handles] attribute"));
        }
        let handles = parse_handles(attr)?;
        handlers.push(parse_handler(method, handles)?);
        method.attrs.retain(|attr| !is_handles(attr));
    }

    let descriptors = handlers.iter().map(generate_descriptor);
    let inherited = args.inherit.iter().map(|member| {
        quote_spanned! {member.span()=>
            handlers.extend(::mvvm_mediator::inherit::<Self, _>(|this: &Self| &this.#member));
        }
    });

    let self_ty = &block.self_ty;
    let (impl_generics, _, where_clause) = block.generics.split_for_impl();

    Ok(quote! {
        #block

        impl #impl_generics ::mvvm_mediator::Recipient for #self_ty #where_clause {
            fn handlers() -> ::std::vec::Vec<::mvvm_mediator::HandlerDescriptor<Self>> {
                #[allow(unused_mut)]
                let mut handlers = ::std::vec![#(#descriptors),*];
                #(#inherited)*
                handlers
            }
        }
    })
}

// ===========================================================================
// Tests
// ===========================================================================
