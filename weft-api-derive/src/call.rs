use darling::{FromAttributes, FromMeta};
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, parse_str, Attribute, DeriveInput, Expr, Type};

use crate::common::{to_compile_error, to_snake_case};

/// Options accepted by `#[call(...)]`
#[derive(Debug, Default, FromMeta)]
pub struct CallOptions {
    /// Name of the task in the worker's definitions
    #[darling(default)]
    task: Option<String>,
    /// Output type of the task
    #[darling(default)]
    result: Option<String>,
    /// Boolean expression over `self`, checked before the call is posted
    #[darling(default)]
    validate: Option<String>,
    /// Per-call timeout in seconds
    #[darling(default)]
    timeout: Option<u64>,
}

#[derive(Debug, FromAttributes)]
#[darling(attributes(call))]
pub struct CallArgs {
    #[darling(flatten)]
    opts: CallOptions,
}

fn parse_call_attrs(attrs: &[Attribute]) -> darling::Result<CallOptions> {
    CallArgs::from_attributes(attrs).map(|a| a.opts)
}

pub fn derive_call_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match input.data {
        syn::Data::Struct(_) | syn::Data::Enum(_) => (),
        syn::Data::Union(_) => {
            return to_compile_error(syn::Error::new_spanned(
                &input.ident,
                "Call cannot be derived for unions",
            ));
        }
    }

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let options = match parse_call_attrs(&input.attrs) {
        Ok(options) => options,
        Err(err) => return err.write_errors().into(),
    };

    let task_name = options
        .task
        .unwrap_or_else(|| to_snake_case(&name.to_string()));

    let result_type = match options.result.as_deref().map(parse_str::<Type>) {
        None => quote! { () },
        Some(Ok(ty)) => quote! { #ty },
        Some(Err(err)) => return to_compile_error(err),
    };

    let validate_impl = match options.validate {
        Some(validate_expr) => {
            let expr = match parse_str::<Expr>(&validate_expr) {
                Ok(expr) => expr,
                Err(err) => return to_compile_error(err),
            };
            quote! {
                fn validate(&self) -> Result<(), weft_api::errors::CodecError> {
                    if #expr {
                        Ok(())
                    } else {
                        Err(weft_api::errors::CodecError::Validation {
                            task: #task_name,
                            rule: #validate_expr,
                        })
                    }
                }
            }
        }
        None => quote! {},
    };

    let timeout_impl = match options.timeout {
        Some(secs) => quote! {
            fn timeout() -> Option<std::time::Duration> {
                Some(std::time::Duration::from_secs(#secs))
            }
        },
        None => quote! {},
    };

    let expanded = quote! {
        impl #impl_generics weft_api::Call for #name #ty_generics #where_clause {
            type Output = #result_type;

            fn task_name() -> &'static str {
                #task_name
            }

            #validate_impl

            #timeout_impl
        }
    };

    TokenStream::from(expanded)
}
