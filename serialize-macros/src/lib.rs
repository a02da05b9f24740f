// This file is part of kestrel-ledger.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Derive macros for `kestrel-serialize`.
//!
//! `#[derive(Serializable)]` implements `Serializable` and `Deserializable` for
//! structs and enums whose fields are all serializable. Adding
//! `#[tag = "some-tag[v1]"]` additionally implements `Tagged`.
//!
//! Enums are encoded as a `u8` variant index followed by the variant's fields,
//! so reordering variants changes the wire format.
extern crate proc_macro;
use proc_macro2::{Ident, Span, TokenStream};
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Expr, Fields, Generics, Meta, parse_macro_input, parse_quote};

#[proc_macro_derive(Serializable, attributes(tag))]
pub fn derive_serializable(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;
    let body = Body::of(&input.data, name)?;
    let (write, size, read) = (&body.write, &body.size, &body.read);

    let ser_generics = with_bound(&input.generics, parse_quote!(Serializable));
    let (ser_impl, ser_ty, ser_where) = ser_generics.split_for_impl();
    let de_generics = with_bound(&input.generics, parse_quote!(Deserializable));
    let (de_impl, de_ty, de_where) = de_generics.split_for_impl();

    let mut expanded = quote! {
        impl #ser_impl Serializable for #name #ser_ty #ser_where {
            fn serialize(&self, writer: &mut impl ::std::io::Write) -> ::std::io::Result<()> {
                #write
                Ok(())
            }

            fn serialized_size(&self) -> usize {
                #size
            }
        }

        impl #de_impl Deserializable for #name #de_ty #de_where {
            fn deserialize(
                reader: &mut impl ::std::io::Read,
                mut recursion_depth: u32,
            ) -> ::std::io::Result<Self> {
                <Self as Deserializable>::check_rec(&mut recursion_depth)?;
                #read
            }
        }
    };

    if let Some(tag) = tag_attr(input) {
        expanded.extend(expand_tagged(input, tag, &body.factor));
    }
    Ok(expanded)
}

fn tag_attr(input: &DeriveInput) -> Option<&Expr> {
    input.attrs.iter().find_map(|attr| match &attr.meta {
        Meta::NameValue(nv) if nv.path.is_ident("tag") => Some(&nv.value),
        _ => None,
    })
}

fn with_bound(generics: &Generics, bound: syn::TypeParamBound) -> Generics {
    let mut generics = generics.clone();
    for param in generics.type_params_mut() {
        param.bounds.push(bound.clone());
    }
    generics
}

fn expand_tagged(input: &DeriveInput, tag: &Expr, factor: &TokenStream) -> TokenStream {
    let name = &input.ident;
    let generics = with_bound(&input.generics, parse_quote!(Tagged));
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let params = generics
        .type_params()
        .map(|param| &param.ident)
        .collect::<Vec<_>>();
    // Generic types append their arguments' tags: `name(arg1,arg2)`.
    let tag_expr = if params.is_empty() {
        quote! { ::std::borrow::Cow::Borrowed(#tag) }
    } else {
        quote! {
            ::std::borrow::Cow::Owned(::std::format!(
                "{}({})",
                #tag,
                [#(<#params as Tagged>::tag().into_owned()),*].join(",")
            ))
        }
    };
    quote! {
        impl #impl_generics Tagged for #name #ty_generics #where_clause {
            fn tag() -> ::std::borrow::Cow<'static, str> {
                #tag_expr
            }
            fn tag_unique_factor() -> String {
                #factor
            }
        }
    }
}

/// The generated bodies of the three trait methods plus the tag factor.
struct Body {
    write: TokenStream,
    size: TokenStream,
    read: TokenStream,
    factor: TokenStream,
}

/// Field layout of one struct or enum variant.
struct Shape<'a> {
    fields: &'a Fields,
    bindings: Vec<Ident>,
}

impl<'a> Shape<'a> {
    fn new(fields: &'a Fields) -> Self {
        let bindings = fields
            .iter()
            .enumerate()
            .map(|(i, f)| match &f.ident {
                Some(ident) => format_ident!("field_{}", ident),
                None => Ident::new(&format!("field_{i}"), Span::call_site()),
            })
            .collect();
        Shape { fields, bindings }
    }

    /// A pattern binding every field by reference, e.g. `{ a: field_a, .. }`.
    fn pattern(&self) -> TokenStream {
        let bindings = &self.bindings;
        match self.fields {
            Fields::Named(named) => {
                let names = named.named.iter().map(|f| &f.ident);
                quote! { { #(#names: #bindings),* } }
            }
            Fields::Unnamed(_) => quote! { ( #(#bindings),* ) },
            Fields::Unit => TokenStream::new(),
        }
    }

    fn write(&self) -> TokenStream {
        let stmts = self.fields.iter().zip(&self.bindings).map(|(f, b)| {
            let ty = &f.ty;
            quote! { <#ty as Serializable>::serialize(#b, writer)?; }
        });
        quote! { #(#stmts)* }
    }

    fn size(&self) -> TokenStream {
        let terms = self.fields.iter().zip(&self.bindings).map(|(f, b)| {
            let ty = &f.ty;
            quote! { + <#ty as Serializable>::serialized_size(#b) }
        });
        quote! { 0 #(#terms)* }
    }

    fn construct(&self, path: TokenStream) -> TokenStream {
        let reads = self.fields.iter().map(|f| {
            let ty = &f.ty;
            quote! { <#ty as Deserializable>::deserialize(reader, recursion_depth)? }
        });
        match self.fields {
            Fields::Named(named) => {
                let names = named.named.iter().map(|f| &f.ident);
                quote! { #path { #(#names: #reads),* } }
            }
            Fields::Unnamed(_) => quote! { #path ( #(#reads),* ) },
            Fields::Unit => path,
        }
    }

    fn factor(&self) -> TokenStream {
        if self.bindings.is_empty() {
            return quote! { ::std::string::String::from("()") };
        }
        let tys = self.fields.iter().map(|f| &f.ty);
        quote! {
            ::std::format!("({})", [#(<#tys as Tagged>::tag().into_owned()),*].join(","))
        }
    }
}

impl Body {
    fn of(data: &Data, name: &Ident) -> syn::Result<Self> {
        match data {
            Data::Struct(data) => {
                let shape = Shape::new(&data.fields);
                let pattern = shape.pattern();
                let (write, size) = (shape.write(), shape.size());
                let read = shape.construct(quote!(Self));
                let factor = shape.factor();
                Ok(Body {
                    write: quote! { let Self #pattern = self; #write },
                    size: quote! { let Self #pattern = self; #size },
                    read: quote! { Ok(#read) },
                    factor,
                })
            }
            Data::Enum(data) => {
                if data.variants.len() > u8::MAX as usize + 1 {
                    return Err(syn::Error::new_spanned(
                        name,
                        "enums with more than 256 variants cannot be derived",
                    ));
                }
                let mut write_arms = Vec::new();
                let mut size_arms = Vec::new();
                let mut read_arms = Vec::new();
                let mut factors = Vec::new();
                for (i, variant) in data.variants.iter().enumerate() {
                    let discriminant = i as u8;
                    let ident = &variant.ident;
                    let shape = Shape::new(&variant.fields);
                    let pattern = shape.pattern();
                    let (write, size) = (shape.write(), shape.size());
                    let read = shape.construct(quote!(Self::#ident));
                    write_arms.push(quote! {
                        Self::#ident #pattern => {
                            <u8 as Serializable>::serialize(&#discriminant, writer)?;
                            #write
                        }
                    });
                    size_arms.push(quote! { Self::#ident #pattern => 1 + #size, });
                    read_arms.push(quote! { #discriminant => Ok(#read), });
                    factors.push(shape.factor());
                }
                let write = if write_arms.is_empty() {
                    quote! { match *self {} }
                } else {
                    quote! { match self { #(#write_arms)* } }
                };
                let size = if size_arms.is_empty() {
                    quote! { match *self {} }
                } else {
                    quote! { match self { #(#size_arms)* } }
                };
                Ok(Body {
                    write,
                    size,
                    read: quote! {
                        match <u8 as Deserializable>::deserialize(reader, recursion_depth)? {
                            #(#read_arms)*
                            other => Err(::std::io::Error::new(
                                ::std::io::ErrorKind::InvalidData,
                                ::std::format!(
                                    "unrecognised discriminant {} for {}",
                                    other,
                                    ::std::stringify!(#name)
                                ),
                            )),
                        }
                    },
                    factor: if factors.is_empty() {
                        quote! { ::std::string::String::from("[]") }
                    } else {
                        quote! { ::std::format!("[{}]", [#(#factors),*].join(",")) }
                    },
                })
            }
            Data::Union(_) => Err(syn::Error::new_spanned(
                name,
                "Serializable cannot be derived for unions",
            )),
        }
    }
}
