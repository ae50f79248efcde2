//! Generates the `Binding` implementation.

use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};

use crate::model::{DeriveBinding, DeriveField, MapVal, Scalar, Storage, Wrap};

fn cell_kind(scalar: Scalar) -> TokenStream2 {
    let ident = format_ident!("{}", scalar.cell_kind());
    quote! { ::tiller::CellKind::#ident }
}

fn shape_expr(storage: &Storage) -> TokenStream2 {
    match storage {
        Storage::Scalar { scalar, .. } => {
            let kind = cell_kind(*scalar);
            quote! { ::tiller::FieldShape::Scalar(#kind) }
        }
        Storage::Seq(scalar) => {
            let kind = cell_kind(*scalar);
            quote! { ::tiller::FieldShape::Seq(#kind) }
        }
        Storage::Map { key, value } => {
            let key_kind = cell_kind(*key);
            let value = match value {
                MapVal::Scalar(scalar) => {
                    let kind = cell_kind(*scalar);
                    quote! { ::tiller::MapValShape::Scalar(#kind) }
                }
                MapVal::Seq(scalar) => {
                    let kind = cell_kind(*scalar);
                    quote! { ::tiller::MapValShape::Seq(#kind) }
                }
            };

            quote! { ::tiller::FieldShape::Map(#key_kind, #value) }
        }
    }
}

// `acc` is an owned/copied place expression of the scalar type.
fn place_to_cell(scalar: Scalar, acc: TokenStream2) -> TokenStream2 {
    match scalar {
        Scalar::Str => quote! { ::tiller::DynCell::Str(#acc.clone()) },
        Scalar::Bool => quote! { ::tiller::DynCell::Bool(#acc) },
        Scalar::I8 | Scalar::I16 | Scalar::I32 | Scalar::I64 => {
            quote! { ::tiller::DynCell::Int(#acc as i64) }
        }
        Scalar::U8 | Scalar::U16 | Scalar::U32 | Scalar::U64 => {
            quote! { ::tiller::DynCell::Uint(#acc as u64) }
        }
        Scalar::F32 | Scalar::F64 => quote! { ::tiller::DynCell::Float(#acc as f64) },
        Scalar::Time => quote! { ::tiller::DynCell::Time(::core::option::Option::Some(#acc)) },
        Scalar::Regex => {
            quote! { ::tiller::DynCell::Regex(::core::option::Option::Some(#acc.clone())) }
        }
    }
}

// `acc` is a reference to the scalar type.
fn ref_to_cell(scalar: Scalar, acc: TokenStream2) -> TokenStream2 {
    match scalar {
        Scalar::Str => quote! { ::tiller::DynCell::Str(#acc.clone()) },
        Scalar::Bool => quote! { ::tiller::DynCell::Bool(*#acc) },
        Scalar::I8 | Scalar::I16 | Scalar::I32 | Scalar::I64 => {
            quote! { ::tiller::DynCell::Int(*#acc as i64) }
        }
        Scalar::U8 | Scalar::U16 | Scalar::U32 | Scalar::U64 => {
            quote! { ::tiller::DynCell::Uint(*#acc as u64) }
        }
        Scalar::F32 | Scalar::F64 => quote! { ::tiller::DynCell::Float(*#acc as f64) },
        Scalar::Time => quote! { ::tiller::DynCell::Time(::core::option::Option::Some(*#acc)) },
        Scalar::Regex => {
            quote! { ::tiller::DynCell::Regex(::core::option::Option::Some(#acc.clone())) }
        }
    }
}

// Pattern (with the given binding ident) and the conversion from that
// binding back to the concrete type.
fn cell_pattern(scalar: Scalar, binding: &str) -> (TokenStream2, TokenStream2) {
    let v = format_ident!("{binding}");
    match scalar {
        Scalar::Str => (
            quote! { ::tiller::DynCell::Str(#v) },
            quote! { #v.clone() },
        ),
        Scalar::Bool => (quote! { ::tiller::DynCell::Bool(#v) }, quote! { *#v }),
        Scalar::I8 => (quote! { ::tiller::DynCell::Int(#v) }, quote! { *#v as i8 }),
        Scalar::I16 => (quote! { ::tiller::DynCell::Int(#v) }, quote! { *#v as i16 }),
        Scalar::I32 => (quote! { ::tiller::DynCell::Int(#v) }, quote! { *#v as i32 }),
        Scalar::I64 => (quote! { ::tiller::DynCell::Int(#v) }, quote! { *#v }),
        Scalar::U8 => (quote! { ::tiller::DynCell::Uint(#v) }, quote! { *#v as u8 }),
        Scalar::U16 => (quote! { ::tiller::DynCell::Uint(#v) }, quote! { *#v as u16 }),
        Scalar::U32 => (quote! { ::tiller::DynCell::Uint(#v) }, quote! { *#v as u32 }),
        Scalar::U64 => (quote! { ::tiller::DynCell::Uint(#v) }, quote! { *#v }),
        Scalar::F32 => (quote! { ::tiller::DynCell::Float(#v) }, quote! { *#v as f32 }),
        Scalar::F64 => (quote! { ::tiller::DynCell::Float(#v) }, quote! { *#v }),
        Scalar::Time => (
            quote! { ::tiller::DynCell::Time(::core::option::Option::Some(#v)) },
            quote! { *#v },
        ),
        Scalar::Regex => (
            quote! { ::tiller::DynCell::Regex(::core::option::Option::Some(#v)) },
            quote! { #v.clone() },
        ),
    }
}

fn load_expr(field: &DeriveField) -> TokenStream2 {
    let name = &field.field_name;

    match &field.storage {
        Storage::Scalar { scalar, wrap } => match wrap {
            None => place_to_cell(*scalar, quote! { s.#name }),
            Some(Wrap::Boxed) => place_to_cell(*scalar, quote! { (*s.#name) }),
            Some(Wrap::Option) => match scalar {
                Scalar::Time => quote! { ::tiller::DynCell::Time(s.#name) },
                Scalar::Regex => quote! { ::tiller::DynCell::Regex(s.#name.clone()) },
                Scalar::Str => {
                    quote! { ::tiller::DynCell::Str(s.#name.clone().unwrap_or_default()) }
                }
                _ => place_to_cell(*scalar, quote! { s.#name.unwrap_or_default() }),
            },
        },
        Storage::Seq(scalar) => {
            let element = ref_to_cell(*scalar, quote! { item });
            quote! {
                ::tiller::DynCell::Seq(s.#name.iter().map(|item| #element).collect())
            }
        }
        Storage::Map { key, value } => {
            let key_cell = ref_to_cell(*key, quote! { k });
            let value_cell = match value {
                MapVal::Scalar(scalar) => ref_to_cell(*scalar, quote! { v }),
                MapVal::Seq(scalar) => {
                    let element = ref_to_cell(*scalar, quote! { item });
                    quote! {
                        ::tiller::DynCell::Seq(v.iter().map(|item| #element).collect())
                    }
                }
            };

            quote! {
                ::tiller::DynCell::Map(
                    s.#name.iter().map(|(k, v)| (#key_cell, #value_cell)).collect(),
                )
            }
        }
    }
}

fn store_stmts(field: &DeriveField) -> TokenStream2 {
    let name = &field.field_name;

    match &field.storage {
        Storage::Scalar { scalar, wrap } => {
            let (pattern, conversion) = cell_pattern(*scalar, "v");
            match wrap {
                None => quote! {
                    if let #pattern = cell {
                        s.#name = #conversion;
                    }
                },
                Some(Wrap::Boxed) => quote! {
                    if let #pattern = cell {
                        *s.#name = #conversion;
                    }
                },
                Some(Wrap::Option) => match scalar {
                    Scalar::Time => quote! {
                        if let ::tiller::DynCell::Time(v) = cell {
                            s.#name = *v;
                        }
                    },
                    Scalar::Regex => quote! {
                        if let ::tiller::DynCell::Regex(v) = cell {
                            s.#name = v.clone();
                        }
                    },
                    _ => quote! {
                        if let #pattern = cell {
                            s.#name = ::core::option::Option::Some(#conversion);
                        }
                    },
                },
            }
        }
        Storage::Seq(scalar) => {
            let (pattern, conversion) = cell_pattern(*scalar, "v");
            quote! {
                if let ::tiller::DynCell::Seq(items) = cell {
                    s.#name = items
                        .iter()
                        .filter_map(|item| match item {
                            #pattern => ::core::option::Option::Some(#conversion),
                            _ => ::core::option::Option::None,
                        })
                        .collect();
                }
            }
        }
        Storage::Map { key, value } => {
            let (key_pattern, key_conversion) = cell_pattern(*key, "k");
            let (value_pattern, value_conversion) = match value {
                MapVal::Scalar(scalar) => cell_pattern(*scalar, "v"),
                MapVal::Seq(scalar) => {
                    let (pattern, conversion) = cell_pattern(*scalar, "v");
                    (
                        quote! { ::tiller::DynCell::Seq(items) },
                        quote! {
                            items
                                .iter()
                                .filter_map(|item| match item {
                                    #pattern => ::core::option::Option::Some(#conversion),
                                    _ => ::core::option::Option::None,
                                })
                                .collect::<::std::vec::Vec<_>>()
                        },
                    )
                }
            };

            quote! {
                if let ::tiller::DynCell::Map(pairs) = cell {
                    s.#name = pairs
                        .iter()
                        .filter_map(|(key_cell, value_cell)| {
                            match (key_cell, value_cell) {
                                (#key_pattern, #value_pattern) => ::core::option::Option::Some(
                                    (#key_conversion, #value_conversion),
                                ),
                                _ => ::core::option::Option::None,
                            }
                        })
                        .collect();
                }
            }
        }
    }
}

impl From<DeriveBinding> for TokenStream2 {
    fn from(binding: DeriveBinding) -> TokenStream2 {
        let struct_name = &binding.struct_name;
        let count = binding.fields.len();

        let mut helper_fns = Vec::new();
        let mut descriptors = Vec::new();

        for (i, field) in binding.fields.iter().enumerate() {
            let load_name = format_ident!("__tiller_load_{i}");
            let store_name = format_ident!("__tiller_store_{i}");
            let load_body = load_expr(field);
            let store_body = store_stmts(field);

            helper_fns.push(quote! {
                fn #load_name(s: &#struct_name) -> ::tiller::DynCell {
                    #load_body
                }

                fn #store_name(s: &mut #struct_name, cell: &::tiller::DynCell) {
                    #store_body
                }
            });

            let tag = &field.tag;
            let shape = shape_expr(&field.storage);
            descriptors.push(quote! {
                ::tiller::FieldDesc {
                    tag: #tag,
                    shape: #shape,
                    load: #load_name,
                    store: #store_name,
                }
            });
        }

        quote! {
            const _: () = {
                impl ::tiller::Binding for #struct_name {
                    fn fields() -> &'static [::tiller::FieldDesc<Self>] {
                        #(#helper_fns)*

                        static FIELDS: [::tiller::FieldDesc<#struct_name>; #count] =
                            [#(#descriptors),*];

                        &FIELDS
                    }
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeriveBinding;
    use crate::test::assert_contains;
    use syn::parse_quote;

    fn render(input: syn::DeriveInput) -> String {
        let binding = DeriveBinding::try_from(input).unwrap();
        TokenStream2::from(binding).to_string()
    }

    #[test]
    fn scalar_field() {
        let rendered = render(parse_quote! {
            struct Config {
                #[cli("v|verbose#print more details")]
                verbose: bool,
                untagged: u64,
            }
        });

        assert_contains!(rendered, "impl :: tiller :: Binding for Config");
        assert_contains!(rendered, "\"v|verbose#print more details\"");
        assert_contains!(rendered, ":: tiller :: CellKind :: Bool");
        // the untagged field does not participate
        assert!(!rendered.contains("untagged"));
    }

    #[test]
    fn container_fields() {
        let rendered = render(parse_quote! {
            struct Config {
                #[cli("tag")]
                tags: Vec<String>,
                #[cli("limit,value=size")]
                limits: HashMap<String, u64>,
            }
        });

        assert_contains!(rendered, ":: tiller :: FieldShape :: Seq");
        assert_contains!(rendered, ":: tiller :: FieldShape :: Map");
        assert_contains!(rendered, ":: tiller :: MapValShape :: Scalar");
        assert_contains!(rendered, "__tiller_load_0");
        assert_contains!(rendered, "__tiller_store_1");
    }

    #[test]
    fn rejects_non_structs() {
        let input: syn::DeriveInput = parse_quote! {
            enum Nope {
                A,
            }
        };
        assert!(DeriveBinding::try_from(input).is_err());
    }

    #[test]
    fn rejects_unsupported_types() {
        let input: syn::DeriveInput = parse_quote! {
            struct Config {
                #[cli("addr")]
                addr: std::net::IpAddr,
            }
        };
        assert!(DeriveBinding::try_from(input).is_err());
    }
}
