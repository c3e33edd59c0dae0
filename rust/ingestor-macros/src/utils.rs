use proc_macro2::{Ident, Span, TokenStream};
use proc_macro_crate::FoundCrate;
use quote::quote;

/// Resolves the path a derive expansion should use to refer to
/// `ingestor-core`, accounting for the crate being renamed or re-exported,
/// and for the degenerate case of expanding inside `ingestor-core` itself
/// (its own test modules).
pub fn crate_name() -> TokenStream {
    match proc_macro_crate::crate_name("ingestor-core").expect("ingestor-core crate in Cargo.toml")
    {
        FoundCrate::Itself => quote!(crate),
        FoundCrate::Name(name) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!( ::#ident )
        }
    }
}
