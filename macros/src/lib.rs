//! Augment the development of the horizon dataset with procedural macros.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Ident, ItemFn, LitStr};

/// Levels accepted by [macro@test_traced].
const LEVELS: [&str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];

/// Run a test function with a `tracing` subscriber that writes to the test output.
///
/// The maximum level defaults to `DEBUG` and can be overridden with a string literal:
///
/// ```rust,ignore
/// use horizon_macros::test_traced;
///
/// #[test_traced("INFO")]
/// fn test_with_info_logs() {
///     tracing::info!("visible");
///     tracing::debug!("filtered");
/// }
/// ```
///
/// The calling crate must depend on `tracing` and `tracing-subscriber`.
#[proc_macro_attribute]
pub fn test_traced(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    // Parse the requested level
    let level = if attr.is_empty() {
        String::from("DEBUG")
    } else {
        let literal = parse_macro_input!(attr as LitStr);
        let level = literal.value().to_uppercase();
        if !LEVELS.contains(&level.as_str()) {
            return syn::Error::new(
                literal.span(),
                format!("unknown level `{}`; expected one of {:?}", level, LEVELS),
            )
            .to_compile_error()
            .into();
        }
        level
    };
    let level = Ident::new(&level, Span::call_site());

    let attrs = input.attrs;
    let vis = input.vis;
    let sig = input.sig;
    let block = input.block;
    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let subscriber = ::tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(::tracing::Level::#level)
                .with_line_number(true)
                .finish();
            let dispatcher = ::tracing::Dispatch::new(subscriber);
            ::tracing::dispatcher::with_default(&dispatcher, || #block)
        }
    };
    TokenStream::from(expanded)
}
