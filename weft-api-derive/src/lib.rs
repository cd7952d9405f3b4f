use proc_macro::TokenStream;

mod call;
mod common;

/// Derives the `Call` trait, binding a request type to a named task and its result type.
///
/// ```rust,ignore
/// use weft_api::Call;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Call, Serialize, Deserialize)]
/// #[call(task = "add", result = "i64", validate = "self.values.len() > 0", timeout = 5)]
/// struct Add {
///     values: Vec<i64>,
/// }
/// ```
///
/// Without `task`, the task name is the struct name in snake_case (`Add` -> `"add"`).
/// Without `result`, the output type is `()`.
#[proc_macro_derive(Call, attributes(call))]
pub fn derive_call(input: TokenStream) -> TokenStream {
    call::derive_call_impl(input)
}
