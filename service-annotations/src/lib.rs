use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, ItemStruct, LitStr, Path};

/// How the generated factory reaches the registry.
enum Linkage {
    /// Export `service_factory_instance` from a cdylib.
    Dynamic,
    /// Submit a `LinkedService` through `inventory` for in-binary registration.
    Static,
}

#[derive(Default)]
struct ServiceArgs {
    name: Option<LitStr>,
    linkage: Option<LitStr>,
    constructor: Option<Path>,
}

/// `#[export_service(name = "org.example.foo")]` turns a struct into a service.
///
/// The struct gets an `AbstractService` impl reporting `name`, and a
/// `<Struct>Factory` implementing `ServiceFactory`. Instances are built with
/// `Default`, or with `constructor = path::to::fn` returning `Result<Self, E>`.
///
/// With the default `linkage = "dynamic"` the crate exports the
/// `service_factory_instance` entry point, so only one service may be exported
/// per cdylib. `linkage = "static"` registers the factory with `inventory`
/// instead; the crate must then depend on `inventory` directly.
#[proc_macro_attribute]
pub fn export_service(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = ServiceArgs::default();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("name") {
            args.name = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("linkage") {
            args.linkage = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("constructor") {
            args.constructor = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("expected `name`, `linkage` or `constructor`"))
        }
    });
    parse_macro_input!(attr with parser);
    let input = parse_macro_input!(item as ItemStruct);

    match expand(args, input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(args: ServiceArgs, input: ItemStruct) -> syn::Result<proc_macro2::TokenStream> {
    let name = args.name.ok_or_else(|| {
        syn::Error::new(
            proc_macro2::Span::call_site(),
            "missing service name: #[export_service(name = \"...\")]",
        )
    })?;
    let linkage = match &args.linkage {
        None => Linkage::Dynamic,
        Some(lit) => match lit.value().as_str() {
            "dynamic" => Linkage::Dynamic,
            "static" => Linkage::Static,
            _ => {
                return Err(syn::Error::new(
                    lit.span(),
                    "linkage must be \"dynamic\" or \"static\"",
                ))
            }
        },
    };
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "services cannot be generic",
        ));
    }

    let service_ty = &input.ident;
    let factory_ty = format_ident!("{}Factory", service_ty);
    let factory_static = format_ident!(
        "__{}_FACTORY",
        service_ty.to_string().to_uppercase()
    );

    let construct = match &args.constructor {
        Some(path) => quote! { #path()? },
        None => quote! { <#service_ty as ::core::default::Default>::default() },
    };

    let registration = match linkage {
        Linkage::Dynamic => quote! {
            static __SERVICE_DECLARATION: service_interface::ServiceDeclaration =
                service_interface::ServiceDeclaration::new(&#factory_static);

            // Only the pointer crosses the boundary; the host reads it as a
            // `ServiceDeclaration` built by the same interface crate.
            #[no_mangle]
            #[allow(improper_ctypes_definitions)]
            pub extern "C" fn service_factory_instance() -> *const service_interface::ServiceDeclaration {
                &__SERVICE_DECLARATION
            }
        },
        Linkage::Static => quote! {
            inventory::submit! {
                service_interface::LinkedService::new(&#factory_static)
            }
        },
    };

    Ok(quote! {
        #input

        impl service_interface::AbstractService for #service_ty {
            fn name(&self) -> &str {
                #name
            }
        }

        /// Factory generated by `#[export_service]`.
        pub struct #factory_ty;

        impl service_interface::ServiceFactory for #factory_ty {
            fn service_name(&self) -> &str {
                #name
            }

            fn create(
                &self,
            ) -> ::core::result::Result<
                ::std::boxed::Box<dyn service_interface::AbstractService>,
                service_interface::CreateError,
            > {
                let service: #service_ty = #construct;
                ::core::result::Result::Ok(::std::boxed::Box::new(service))
            }
        }

        static #factory_static: #factory_ty = #factory_ty;

        #registration
    })
}
