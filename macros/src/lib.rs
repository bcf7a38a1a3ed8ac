use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::spanned::Spanned;
use syn::{parse_macro_input, Attribute, FnArg, ImplItem, ItemImpl, LitInt, LitStr, Meta, Type};

const ROUTE_METHODS: [&str; 5] = ["get", "post", "put", "delete", "patch"];
const HELPER_ATTRS: [&str; 3] = ["version", "secured", "utoipa_response"];

/// Macro that turns an impl block into a `keystone_core::controller::Controller`
///
/// Every method carrying a route attribute becomes a route definition and an
/// OpenAPI operation. Handlers must be associated functions (no `self`) with a
/// concrete return type.
///
/// Usage:
/// ```rust,ignore
/// struct UsersController;
///
/// #[controller(version = "2")]
/// impl UsersController {
///     #[get("/users")]
///     #[secured("staff-auth")]
///     #[utoipa_response(status = 200, body = Vec<User>, description = "All users")]
///     async fn list() -> Json<Vec<User>> { ... }
///
///     #[post("/users")]
///     #[version("3")]
///     async fn create(Json(user): Json<NewUser>) -> Json<User> { ... }
/// }
/// ```
///
/// The controller version applies to routes without their own `#[version]`;
/// routes with neither take the application's default version.
#[proc_macro_attribute]
pub fn controller(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut controller_version: Option<LitStr> = None;
    let args_parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("version") {
            controller_version = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unsupported controller argument, expected `version = \"..\"`"))
        }
    });
    parse_macro_input!(args with args_parser);

    let mut impl_block = parse_macro_input!(input as ItemImpl);
    let self_ty = impl_block.self_ty.clone();
    let struct_name = match &*self_ty {
        Type::Path(type_path) => match type_path.path.segments.last() {
            Some(segment) => segment.ident.clone(),
            None => {
                return syn::Error::new(self_ty.span(), "Expected a struct type")
                    .to_compile_error()
                    .into();
            }
        },
        _ => {
            return syn::Error::new(impl_block.span(), "Expected a struct type")
                .to_compile_error()
                .into();
        }
    };
    let struct_name_str = struct_name.to_string();

    let mut route_definitions = Vec::new();
    let mut openapi_path_functions = Vec::new();
    let mut openapi_path_names = Vec::new();
    let mut schema_types = Vec::new();

    for item in &impl_block.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        let Some((http_method, path)) = extract_route_attr(&method.attrs) else {
            continue;
        };
        let fn_name = &method.sig.ident;

        if method
            .sig
            .inputs
            .iter()
            .any(|input| matches!(input, FnArg::Receiver(_)))
        {
            return syn::Error::new(
                method.sig.span(),
                "controller handlers must be associated functions without `self`",
            )
            .to_compile_error()
            .into();
        }

        let version = match extract_version_attr(&method.attrs) {
            Ok(version) => version.or_else(|| controller_version.clone()),
            Err(err) => return err.to_compile_error().into(),
        };
        let version_tokens = match &version {
            Some(version) => quote! { ::core::option::Option::Some(#version) },
            None => quote! { ::core::option::Option::None },
        };

        let method_const = format_ident!("{}", http_method.to_uppercase());
        let axum_method = format_ident!("{}", http_method);
        let path_lit = LitStr::new(&path, method.span());

        route_definitions.push(quote! {
            keystone_core::controller::RouteDefinition {
                method: axum::http::Method::#method_const,
                path: #path_lit,
                version: #version_tokens,
                handler: axum::routing::#axum_method(<#self_ty>::#fn_name),
            }
        });

        // utoipa needs a free function to hang `#[utoipa::path]` on. The
        // wrapper shares the handler's signature and is never called.
        let wrapper_name = format_ident!(
            "__keystone_path_{}_{}",
            struct_name_str.to_lowercase(),
            fn_name
        );
        let fn_async = method.sig.asyncness;
        let fn_inputs = &method.sig.inputs;
        let fn_output = &method.sig.output;
        let fn_generics = &method.sig.generics;
        let fn_where_clause = &method.sig.generics.where_clause;
        let operation_id = format!("{}_{}", struct_name_str, fn_name);

        let responses = match extract_utoipa_response_attrs(&method.attrs) {
            Ok(responses) => responses,
            Err(err) => return err.to_compile_error().into(),
        };
        let security = match extract_secured_attrs(&method.attrs) {
            Ok(security) => security,
            Err(err) => return err.to_compile_error().into(),
        };

        let mut path_attr_tokens = quote! {
            #axum_method,
            path = #path_lit,
            tag = #struct_name_str,
            operation_id = #operation_id
        };

        if !responses.is_empty() {
            let response_tokens = responses.iter().map(|response| &response.tokens);
            path_attr_tokens.extend(quote! {
                , responses(#(#response_tokens),*)
            });
            schema_types.extend(responses.iter().map(|response| response.body.clone()));
        }

        if !security.is_empty() {
            path_attr_tokens.extend(quote! {
                , security(#((#security = [])),*)
            });
        }

        openapi_path_functions.push(quote! {
            #[doc = concat!("OpenAPI operation for ", #struct_name_str, "::", stringify!(#fn_name))]
            #[allow(dead_code, unused_variables)]
            #[utoipa::path(#path_attr_tokens)]
            #fn_async fn #wrapper_name #fn_generics(#fn_inputs) #fn_output #fn_where_clause {
                unimplemented!("documentation-only wrapper")
            }
        });
        openapi_path_names.push(wrapper_name);
    }

    // Remove duplicates from schema_types (comparing by string representation)
    let mut unique_schemas = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for schema_type in schema_types {
        if seen.insert(quote!(#schema_type).to_string()) {
            unique_schemas.push(schema_type);
        }
    }

    let api_struct_name = format_ident!("{}Api", struct_name);
    let openapi_attr = if unique_schemas.is_empty() {
        quote! {
            #[derive(utoipa::OpenApi)]
            #[openapi(paths(#(#openapi_path_names),*))]
        }
    } else {
        quote! {
            #[derive(utoipa::OpenApi)]
            #[openapi(
                paths(#(#openapi_path_names),*),
                components(schemas(#(#unique_schemas),*))
            )]
        }
    };

    strip_helper_attrs(&mut impl_block);

    let expanded = quote! {
        #impl_block

        impl keystone_core::controller::Controller for #self_ty {
            fn routes() -> ::std::vec::Vec<keystone_core::controller::RouteDefinition> {
                ::std::vec![#(#route_definitions),*]
            }

            fn openapi() -> utoipa::openapi::OpenApi {
                <#api_struct_name as utoipa::OpenApi>::openapi()
            }
        }

        #(#openapi_path_functions)*

        #openapi_attr
        pub struct #api_struct_name;
    };

    TokenStream::from(expanded)
}

fn attr_name(attr: &Attribute) -> Option<String> {
    attr.path()
        .segments
        .last()
        .map(|segment| segment.ident.to_string())
}

/// Extract route information from attributes
/// Looks for `#[get("/path")]` or `#[keystone_macros::get("/path")]`
fn extract_route_attr(attrs: &[Attribute]) -> Option<(String, String)> {
    for attr in attrs {
        let Some(method) = attr_name(attr) else {
            continue;
        };
        if !ROUTE_METHODS.contains(&method.as_str()) {
            continue;
        }

        if let Meta::List(meta) = &attr.meta {
            if let Ok(path_lit) = syn::parse2::<LitStr>(meta.tokens.clone()) {
                return Some((method, path_lit.value()));
            }
        }
    }
    None
}

fn extract_version_attr(attrs: &[Attribute]) -> syn::Result<Option<LitStr>> {
    for attr in attrs {
        if attr_name(attr).as_deref() == Some("version") {
            return attr.parse_args::<LitStr>().map(Some);
        }
    }
    Ok(None)
}

/// `#[secured("staff-auth")]`, repeatable. Each name must match a security
/// scheme registered on the final document.
fn extract_secured_attrs(attrs: &[Attribute]) -> syn::Result<Vec<LitStr>> {
    attrs
        .iter()
        .filter(|attr| attr_name(attr).as_deref() == Some("secured"))
        .map(|attr| attr.parse_args::<LitStr>())
        .collect()
}

struct ResponseAttr {
    tokens: proc_macro2::TokenStream,
    body: Type,
}

/// Extract all utoipa_response attribute information
/// - `#[utoipa_response(Type)]`: status 200 with `Type` as body
/// - `#[utoipa_response(status = 404, body = Type, description = "Not found")]`
fn extract_utoipa_response_attrs(attrs: &[Attribute]) -> syn::Result<Vec<ResponseAttr>> {
    let mut responses = Vec::new();

    for attr in attrs {
        if attr_name(attr).as_deref() != Some("utoipa_response") {
            continue;
        }
        let Meta::List(meta) = &attr.meta else {
            return Err(syn::Error::new(attr.span(), "expected `utoipa_response(...)`"));
        };

        let (status, description, body) =
            match syn::parse2::<UtoipaResponseArgs>(meta.tokens.clone()) {
                Ok(parsed) => (
                    parsed.status.unwrap_or(200),
                    parsed.description.unwrap_or_else(|| "Success".to_string()),
                    parsed.body,
                ),
                Err(named_err) => match syn::parse2::<Type>(meta.tokens.clone()) {
                    Ok(body) => (200, "Success".to_string(), body),
                    Err(_) => return Err(named_err),
                },
            };

        responses.push(ResponseAttr {
            tokens: quote! {
                (status = #status, description = #description, body = #body)
            },
            body,
        });
    }

    Ok(responses)
}

/// Helper struct to parse utoipa_response attribute arguments
struct UtoipaResponseArgs {
    status: Option<u16>,
    body: Type,
    description: Option<String>,
}

impl syn::parse::Parse for UtoipaResponseArgs {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut status = None;
        let mut body = None;
        let mut description = None;

        while !input.is_empty() {
            let key: syn::Ident = input.parse()?;
            let _eq: syn::Token![=] = input.parse()?;

            match key.to_string().as_str() {
                "status" => {
                    let lit: LitInt = input.parse()?;
                    status = Some(lit.base10_parse::<u16>()?);
                }
                "body" => body = Some(input.parse()?),
                "description" => {
                    let lit: LitStr = input.parse()?;
                    description = Some(lit.value());
                }
                other => {
                    return Err(syn::Error::new(
                        key.span(),
                        format!("Unknown argument: {}", other),
                    ));
                }
            }

            if !input.is_empty() {
                let _comma: syn::Token![,] = input.parse()?;
            }
        }

        let body = body.ok_or_else(|| input.error("`body = Type` is required"))?;

        Ok(UtoipaResponseArgs {
            status,
            body,
            description,
        })
    }
}

/// Route and helper attributes are consumed here, so handlers keep compiling
/// whether or not the attribute macros are in scope.
fn strip_helper_attrs(impl_block: &mut ItemImpl) {
    for item in &mut impl_block.items {
        if let ImplItem::Fn(method) = item {
            method.attrs.retain(|attr| match attr_name(attr) {
                Some(name) => {
                    !ROUTE_METHODS.contains(&name.as_str())
                        && !HELPER_ATTRS.contains(&name.as_str())
                }
                None => true,
            });
        }
    }
}

/// Macro for GET route
#[proc_macro_attribute]
pub fn get(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Macro for POST route
#[proc_macro_attribute]
pub fn post(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Macro for PUT route
#[proc_macro_attribute]
pub fn put(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Macro for DELETE route
#[proc_macro_attribute]
pub fn delete(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Macro for PATCH route
#[proc_macro_attribute]
pub fn patch(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Pins a route to an API version, overriding the controller's.
#[proc_macro_attribute]
pub fn version(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Marks a route as requiring the named bearer-auth scheme in the document.
#[proc_macro_attribute]
pub fn secured(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Attribute macro for specifying utoipa response documentation
///
/// Consumed by `#[controller]`; outside a controller it does nothing.
#[proc_macro_attribute]
pub fn utoipa_response(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}
