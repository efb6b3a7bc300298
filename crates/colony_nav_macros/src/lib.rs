use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn, LitInt};

/// Time a function when the calling crate is built with `perf_stats`.
///
/// The body is wrapped with a drop guard that reports the elapsed time
/// through `tracing::info!` when it exceeds the threshold. Without the
/// feature the guard is compiled out entirely, including the `Instant`
/// read.
///
/// Works on free functions and on methods (`&self` / `&mut self`
/// receivers are left untouched).
///
/// # Example
/// ```ignore
/// #[profile]          // report anything slower than 1ms
/// fn rebuild() { /* ... */ }
///
/// #[profile(4)]       // custom threshold in milliseconds
/// pub fn apply_changes(&mut self) { /* ... */ }
/// ```
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let threshold_ms: u128 = if attr.is_empty() {
        1
    } else {
        match syn::parse::<LitInt>(attr) {
            Ok(lit) => lit.base10_parse().unwrap_or(1),
            Err(err) => return err.to_compile_error().into(),
        }
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let fn_name_str = sig.ident.to_string();

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _profile_timer = {
                struct ProfileGuard {
                    name: &'static str,
                    start: std::time::Instant,
                }
                impl Drop for ProfileGuard {
                    fn drop(&mut self) {
                        let elapsed = self.start.elapsed();
                        if elapsed.as_millis() >= #threshold_ms {
                            ::tracing::info!("[PERF] {}::{}: {:?}", module_path!(), self.name, elapsed);
                        }
                    }
                }
                ProfileGuard {
                    name: #fn_name_str,
                    start: std::time::Instant::now(),
                }
            };

            #block
        }
    };

    output.into()
}
