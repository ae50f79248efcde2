//! Loads the derive input into the model.

use syn::spanned::Spanned;

use crate::model::{DeriveBinding, DeriveField, MapVal, Scalar, Storage, Wrap};

impl TryFrom<syn::DeriveInput> for DeriveBinding {
    type Error = syn::Error;

    fn try_from(value: syn::DeriveInput) -> Result<Self, Self::Error> {
        let span = value.span();
        let syn::Data::Struct(data) = value.data else {
            return Err(syn::Error::new(
                span,
                "Binding may only be derived for structs",
            ));
        };

        let syn::Fields::Named(named) = data.fields else {
            return Err(syn::Error::new(
                span,
                "Binding requires named struct fields",
            ));
        };

        let mut fields = Vec::new();
        for field in named.named {
            let Some(tag) = cli_tag(&field)? else {
                // untagged fields are ignored
                continue;
            };

            let field_name = field
                .ident
                .clone()
                .ok_or_else(|| syn::Error::new(field.span(), "expected a named field"))?;
            let storage = storage_of(&field.ty)?;

            fields.push(DeriveField {
                field_name,
                tag,
                storage,
            });
        }

        Ok(DeriveBinding {
            struct_name: value.ident,
            fields,
        })
    }
}

fn cli_tag(field: &syn::Field) -> Result<Option<String>, syn::Error> {
    for attr in &field.attrs {
        if !attr.path().is_ident("cli") {
            continue;
        }

        let literal: syn::LitStr = attr.parse_args()?;
        return Ok(Some(literal.value()));
    }

    Ok(None)
}

fn last_segment(ty: &syn::Type) -> Option<&syn::PathSegment> {
    match ty {
        syn::Type::Path(path) => path.path.segments.last(),
        _ => None,
    }
}

fn generic_args(segment: &syn::PathSegment) -> Vec<&syn::Type> {
    match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) => args
            .args
            .iter()
            .filter_map(|arg| match arg {
                syn::GenericArgument::Type(ty) => Some(ty),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn scalar_of(ty: &syn::Type) -> Result<Scalar, syn::Error> {
    let Some(segment) = last_segment(ty) else {
        return Err(unsupported(ty));
    };

    Ok(match segment.ident.to_string().as_str() {
        "String" => Scalar::Str,
        "bool" => Scalar::Bool,
        "i8" => Scalar::I8,
        "i16" => Scalar::I16,
        "i32" => Scalar::I32,
        "i64" => Scalar::I64,
        "u8" => Scalar::U8,
        "u16" => Scalar::U16,
        "u32" => Scalar::U32,
        "u64" => Scalar::U64,
        "f32" => Scalar::F32,
        "f64" => Scalar::F64,
        "DateTime" => Scalar::Time,
        "Regex" => Scalar::Regex,
        _ => return Err(unsupported(ty)),
    })
}

fn unsupported(ty: &syn::Type) -> syn::Error {
    syn::Error::new(ty.span(), "unsupported field type for Binding")
}

pub(crate) fn storage_of(ty: &syn::Type) -> Result<Storage, syn::Error> {
    let Some(segment) = last_segment(ty) else {
        return Err(unsupported(ty));
    };

    match segment.ident.to_string().as_str() {
        "Vec" => {
            let args = generic_args(segment);
            let [element] = args.as_slice() else {
                return Err(unsupported(ty));
            };

            Ok(Storage::Seq(scalar_of(element)?))
        }
        "HashMap" => {
            let args = generic_args(segment);
            let [key, value] = args.as_slice() else {
                return Err(unsupported(ty));
            };

            let key = scalar_of(key)?;
            if !matches!(
                key,
                Scalar::Str
                    | Scalar::I8
                    | Scalar::I16
                    | Scalar::I32
                    | Scalar::I64
                    | Scalar::U8
                    | Scalar::U16
                    | Scalar::U32
                    | Scalar::U64
            ) {
                return Err(unsupported(ty));
            }

            let value = match last_segment(value).map(|s| s.ident.to_string()) {
                Some(name) if name == "Vec" => {
                    let inner = generic_args(last_segment(value).expect("checked above"));
                    let [element] = inner.as_slice() else {
                        return Err(unsupported(ty));
                    };

                    MapVal::Seq(scalar_of(element)?)
                }
                _ => MapVal::Scalar(scalar_of(value)?),
            };

            Ok(Storage::Map { key, value })
        }
        "Option" | "Box" => {
            let wrap = if segment.ident == "Option" {
                Wrap::Option
            } else {
                Wrap::Boxed
            };

            let args = generic_args(segment);
            let [inner] = args.as_slice() else {
                return Err(unsupported(ty));
            };

            // one wrapper layer around a plain scalar
            Ok(Storage::Scalar {
                scalar: scalar_of(inner)?,
                wrap: Some(wrap),
            })
        }
        _ => Ok(Storage::Scalar {
            scalar: scalar_of(ty)?,
            wrap: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn scalar_shapes() {
        let ty: syn::Type = parse_quote!(String);
        assert_eq!(
            storage_of(&ty).unwrap(),
            Storage::Scalar {
                scalar: Scalar::Str,
                wrap: None,
            }
        );

        let ty: syn::Type = parse_quote!(u32);
        assert_eq!(
            storage_of(&ty).unwrap(),
            Storage::Scalar {
                scalar: Scalar::U32,
                wrap: None,
            }
        );

        let ty: syn::Type = parse_quote!(chrono::DateTime<chrono::Local>);
        assert_eq!(
            storage_of(&ty).unwrap(),
            Storage::Scalar {
                scalar: Scalar::Time,
                wrap: None,
            }
        );
    }

    #[test]
    fn wrapped_shapes() {
        let ty: syn::Type = parse_quote!(Option<i64>);
        assert_eq!(
            storage_of(&ty).unwrap(),
            Storage::Scalar {
                scalar: Scalar::I64,
                wrap: Some(Wrap::Option),
            }
        );

        let ty: syn::Type = parse_quote!(Box<f64>);
        assert_eq!(
            storage_of(&ty).unwrap(),
            Storage::Scalar {
                scalar: Scalar::F64,
                wrap: Some(Wrap::Boxed),
            }
        );

        let ty: syn::Type = parse_quote!(Option<regex::Regex>);
        assert_eq!(
            storage_of(&ty).unwrap(),
            Storage::Scalar {
                scalar: Scalar::Regex,
                wrap: Some(Wrap::Option),
            }
        );
    }

    #[test]
    fn container_shapes() {
        let ty: syn::Type = parse_quote!(Vec<String>);
        assert_eq!(storage_of(&ty).unwrap(), Storage::Seq(Scalar::Str));

        let ty: syn::Type = parse_quote!(HashMap<String, u64>);
        assert_eq!(
            storage_of(&ty).unwrap(),
            Storage::Map {
                key: Scalar::Str,
                value: MapVal::Scalar(Scalar::U64),
            }
        );

        let ty: syn::Type = parse_quote!(std::collections::HashMap<String, Vec<regex::Regex>>);
        assert_eq!(
            storage_of(&ty).unwrap(),
            Storage::Map {
                key: Scalar::Str,
                value: MapVal::Seq(Scalar::Regex),
            }
        );
    }

    #[test]
    fn rejected_shapes() {
        let ty: syn::Type = parse_quote!(std::net::IpAddr);
        assert!(storage_of(&ty).is_err());

        let ty: syn::Type = parse_quote!(HashMap<f64, String>);
        assert!(storage_of(&ty).is_err());

        let ty: syn::Type = parse_quote!(Vec<Vec<u8>>);
        assert!(storage_of(&ty).is_err());
    }
}
