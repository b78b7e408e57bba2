//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了replicache的宏实现，提供缓存注解功能。

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse::Parser, parse_macro_input, punctuated::Punctuated, spanned::Spanned, Expr, ItemFn,
    Lit, Meta, Token,
};

struct CachedArgs {
    service: String,
    key: Option<String>,
    ttl: Option<u64>,
}

fn parse_args(args: TokenStream) -> syn::Result<CachedArgs> {
    let parser = Punctuated::<Meta, Token![,]>::parse_terminated;
    let metas = parser.parse(args)?;

    let mut parsed = CachedArgs {
        service: "default".to_string(),
        key: None,
        ttl: None,
    };

    for meta in metas {
        let Meta::NameValue(nv) = &meta else {
            return Err(syn::Error::new(meta.span(), "expected `name = value`"));
        };
        let Expr::Lit(expr_lit) = &nv.value else {
            return Err(syn::Error::new(nv.value.span(), "expected a literal"));
        };
        match (&expr_lit.lit, nv.path.get_ident().map(|i| i.to_string())) {
            (Lit::Str(lit), Some(name)) if name == "service" => parsed.service = lit.value(),
            (Lit::Str(lit), Some(name)) if name == "key" => parsed.key = Some(lit.value()),
            (Lit::Int(lit), Some(name)) if name == "ttl" => {
                parsed.ttl = Some(lit.base10_parse::<u64>()?)
            }
            _ => {
                return Err(syn::Error::new(
                    nv.span(),
                    "unknown argument; expected service = \"..\", key = \"..\" or ttl = <secs>",
                ))
            }
        }
    }
    Ok(parsed)
}

/// 把 "products:{id}" 拆成 "products:{}" 和参数名列表
fn split_key_pattern(pattern: &str) -> Result<(String, Vec<String>), String> {
    let mut format = String::with_capacity(pattern.len());
    let mut names = Vec::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                format.push_str("{{");
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => return Err(format!("unclosed '{{' in key \"{}\"", pattern)),
                    }
                }
                let name = name.trim();
                if name.is_empty() || !name.chars().all(|ch| ch == '_' || ch.is_alphanumeric()) {
                    return Err(format!("invalid placeholder {{{}}} in key \"{}\"", name, pattern));
                }
                format.push_str("{}");
                names.push(name.to_string());
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                format.push_str("}}");
            }
            '}' => return Err(format!("unmatched '}}' in key \"{}\"", pattern)),
            _ => format.push(c),
        }
    }
    Ok((format, names))
}

/// 缓存 `async fn` 的结果
///
/// 被注解的函数体成为 `get_or_create` 的生成函数；服务未注册时函数体直接执行。
/// 函数必须返回 `Result<T, E>`，其中 `T` 可序列化。
///
/// ```ignore
/// #[cached(service = "catalog", key = "products:{id}", ttl = 60)]
/// async fn load_product(id: u64) -> Result<Product, DbError> { .. }
/// ```
#[proc_macro_attribute]
pub fn cached(args: TokenStream, item: TokenStream) -> TokenStream {
    let args = match parse_args(args) {
        Ok(args) => args,
        Err(e) => return e.to_compile_error().into(),
    };
    let input = parse_macro_input!(item as ItemFn);

    if input.sig.asyncness.is_none() {
        return syn::Error::new(input.sig.span(), "#[cached] only supports async fn")
            .to_compile_error()
            .into();
    }

    let service_name = &args.service;
    let ttl = match args.ttl {
        Some(secs) => quote! { Some(::std::time::Duration::from_secs(#secs)) },
        None => quote! { None },
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let fn_name = &input.sig.ident;
    let fn_block = &input.block;

    let key_gen = if let Some(pattern) = &args.key {
        let (format, names) = match split_key_pattern(pattern) {
            Ok(parts) => parts,
            Err(msg) => {
                return syn::Error::new(input.sig.span(), msg)
                    .to_compile_error()
                    .into()
            }
        };
        let idents = names
            .iter()
            .map(|name| syn::Ident::new(name, proc_macro2::Span::call_site()));
        quote! { format!(#format, #(#idents),*) }
    } else {
        let arg_names: Vec<_> = input
            .sig
            .inputs
            .iter()
            .filter_map(|arg| match arg {
                syn::FnArg::Typed(pat_type) => match &*pat_type.pat {
                    syn::Pat::Ident(pat_ident) => Some(&pat_ident.ident),
                    _ => None,
                },
                syn::FnArg::Receiver(_) => None,
            })
            .collect();

        if arg_names.is_empty() {
            quote! { format!("{}:{}", #service_name, stringify!(#fn_name)) }
        } else {
            quote! {
                format!("{}:{}:{:?}", #service_name, stringify!(#fn_name), (#(&#arg_names),*))
            }
        }
    };

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            use ::replicache::CacheExt;

            let cache_key = #key_gen;
            let client = match ::replicache::get_client(#service_name) {
                Ok(client) => client,
                Err(_) => return async move #fn_block.await,
            };

            client
                .get_or_create(&cache_key, #ttl, move || async move #fn_block)
                .await
        }
    };

    output.into()
}
