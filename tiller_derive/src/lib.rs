extern crate proc_macro;

mod generate;
mod load;
mod model;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;

use crate::model::DeriveBinding;

/// Derives `tiller::Binding` for a struct, turning its `#[cli("…")]` tagged
/// fields into flags for a `BindIndexer`.
///
/// Supported field types: `String`, `bool`, the fixed-width integers,
/// `f32`/`f64`, `chrono::DateTime<Local>`, `regex::Regex` (the latter two
/// also `Option`-wrapped), `Option`/`Box` wrapped scalars, `Vec<scalar>`,
/// and `HashMap<key, scalar | Vec<scalar>>` with string or integer keys.
///
/// Fields without a `cli` attribute are ignored.
///
/// ### Example
/// ```ignore
/// #[derive(Binding)]
/// struct Config {
///     #[cli("v|verbose#print more details")]
///     verbose: bool,
///     #[cli("l|limit,value=size,def=1G")]
///     limit: u64,
/// }
/// ```
#[proc_macro_derive(Binding, attributes(cli))]
pub fn binding(input: TokenStream) -> TokenStream {
    let derive_input: syn::DeriveInput = match syn::parse(input) {
        Ok(derive_input) => derive_input,
        Err(error) => return error.to_compile_error().into(),
    };

    match DeriveBinding::try_from(derive_input) {
        Err(error) => {
            let compile_error = error.to_compile_error();
            quote! {
                #compile_error
            }
            .into()
        }
        Ok(derive_binding) => TokenStream2::from(derive_binding).into(),
    }
}
