use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr};

use crate::utils::crate_name;

const ATTR: &str = "schema_record";

pub fn derive_impl(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.into_compile_error().into(),
    }
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;
    let crate_name = crate_name();

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input,
            "SchemaRecord can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &input,
            "SchemaRecord requires named fields",
        ));
    };
    if !fields.named.iter().any(|f| f.ident.as_ref().is_some_and(|i| i == "common")) {
        return Err(syn::Error::new_spanned(
            &input,
            "SchemaRecord requires a field named `common: RecordCommon`",
        ));
    }

    let schema_code = schema_code_attr(&input)?;
    let schema_variant = schema_variant_tokens(&schema_code, &input)?;

    Ok(quote! {
        impl #crate_name::record::Record for #ident {
            fn schema(&self) -> #crate_name::enums::Schema {
                #schema_variant
            }

            fn common(&self) -> &#crate_name::record::RecordCommon {
                &self.common
            }

            fn common_mut(&mut self) -> &mut #crate_name::record::RecordCommon {
                &mut self.common
            }
        }
    })
}

fn schema_code_attr(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if !attr.path().is_ident(ATTR) {
            continue;
        }
        let mut found = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("schema") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                found = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("expected `schema = \"...\"`"))
            }
        })?;
        if let Some(code) = found {
            return Ok(code);
        }
    }
    Err(syn::Error::new_spanned(
        input,
        "SchemaRecord requires #[schema_record(schema = \"...\")] with a fixed (non-OHLCV) schema code",
    ))
}

fn schema_variant_tokens(code: &str, input: &DeriveInput) -> syn::Result<TokenStream> {
    match code {
        "trades" => Ok(quote!(Schema::Trades)),
        "tbbo" => Ok(quote!(Schema::Tbbo)),
        "statistics" => Ok(quote!(Schema::Statistics)),
        "definition" => Ok(quote!(Schema::Definition)),
        other => Err(syn::Error::new_spanned(
            input,
            format!(
                "unrecognized fixed schema code '{other}'; OHLCV's schema depends on a field \
                 and must implement Record by hand"
            ),
        )),
    }
    .map(|variant| {
        let crate_name = crate_name();
        quote! {
            use #crate_name::enums::Schema;
            #variant
        }
    })
}
