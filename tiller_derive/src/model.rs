//! The intermediate model between attribute loading and code generation.

/// A scalar storage kind the binding path can erase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Str,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Time,
    Regex,
}

impl Scalar {
    /// The `CellKind` variant name in the core crate.
    pub fn cell_kind(self) -> &'static str {
        match self {
            Scalar::Str => "Str",
            Scalar::Bool => "Bool",
            Scalar::I8 => "I8",
            Scalar::I16 => "I16",
            Scalar::I32 => "I32",
            Scalar::I64 => "I64",
            Scalar::U8 => "U8",
            Scalar::U16 => "U16",
            Scalar::U32 => "U32",
            Scalar::U64 => "U64",
            Scalar::F32 => "F32",
            Scalar::F64 => "F64",
            Scalar::Time => "Time",
            Scalar::Regex => "Regex",
        }
    }
}

/// A single wrapper layer around a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrap {
    Option,
    Boxed,
}

/// The value side of a bound map field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapVal {
    Scalar(Scalar),
    Seq(Scalar),
}

/// The storage shape of one bound field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Scalar { scalar: Scalar, wrap: Option<Wrap> },
    Seq(Scalar),
    Map { key: Scalar, value: MapVal },
}

/// One field participating in the binding.
#[derive(Debug)]
pub struct DeriveField {
    pub field_name: syn::Ident,
    pub tag: String,
    pub storage: Storage,
}

/// The whole derive input, ready for generation.
#[derive(Debug)]
pub struct DeriveBinding {
    pub struct_name: syn::Ident,
    pub fields: Vec<DeriveField>,
}
