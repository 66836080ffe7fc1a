//! `#[proxied]` 宏实现
//!
//! 为 trait 生成：
//! - 方法描述符表与接口描述符（`static`）
//! - `impl ProxyInterface for dyn Trait`：按槽位把调用分派到具体目标，并把代理视为此接口
//! - `impl Trait for InterfaceProxy` / `impl Trait for ClassProxy`：把方法调用转为 `AopProxy::invoke`

use crate::utils::{dyn_trait_ident, generic_type_args, is_unit, last_segment_ident, to_upper_snake};
use proc_macro2::{Ident, Literal, Span, TokenStream};
use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::{
    Attribute, Error, Expr, ExprLit, FnArg, ItemTrait, Lit, Meta, Path, Result, ReturnType, Signature,
    Token, TraitItem, TraitItemFn, Type, TypeParamBound,
};

/// 宏参数
#[derive(Default)]
pub struct ProxiedOptions {
    /// 接口描述的是类自身的方法
    class_methods: bool,
    /// 覆盖接口名
    name: Option<String>,
}

impl ProxiedOptions {
    pub fn from_metas(metas: Punctuated<Meta, Token![,]>) -> Result<Self> {
        let mut options = ProxiedOptions::default();
        for meta in metas {
            match &meta {
                Meta::Path(path) if path.is_ident("class_methods") => options.class_methods = true,
                Meta::NameValue(nv) if nv.path.is_ident("name") => match &nv.value {
                    Expr::Lit(ExprLit {
                        lit: Lit::Str(name), ..
                    }) => options.name = Some(name.value()),
                    other => return Err(Error::new_spanned(other, "expected a string literal")),
                },
                _ => {
                    return Err(Error::new_spanned(
                        meta,
                        "unknown #[proxied] option, expected `class_methods` or `name = \"...\"`",
                    ))
                }
            }
        }
        Ok(options)
    }
}

/// 返回值形态
enum Shape {
    Unit,
    Value(Type),
    Nullable(Type),
    SelfRef,
}

impl Shape {
    fn descriptor(&self, trait_ident: &Ident) -> TokenStream {
        match self {
            Shape::Unit => quote!(),
            Shape::Value(ty) => {
                let name = type_name(ty);
                quote!(.returns(::chimera_aop::ReturnType::Value, #name))
            }
            Shape::Nullable(ty) => {
                let name = type_name(ty);
                quote!(.returns(::chimera_aop::ReturnType::Nullable, #name))
            }
            Shape::SelfRef => {
                let name = format!("Arc<dyn {}>", trait_ident);
                quote!(.returns(::chimera_aop::ReturnType::SelfRef, #name))
            }
        }
    }
}

struct ProxiedMethod {
    sig: Signature,
    params: Vec<Type>,
    variadic: bool,
    shape: Shape,
    throws: Vec<Path>,
    sealed: bool,
}

pub fn expand(options: ProxiedOptions, mut item: ItemTrait) -> Result<TokenStream> {
    if !item.generics.params.is_empty() || item.generics.where_clause.is_some() {
        return Err(Error::new_spanned(&item.generics, "#[proxied] traits cannot be generic"));
    }
    check_supertraits(&mut item)?;

    let trait_ident = item.ident.clone();
    let mut methods = Vec::new();
    for trait_item in &mut item.items {
        match trait_item {
            TraitItem::Fn(method) => methods.push(parse_method(method, &trait_ident)?),
            other => {
                return Err(Error::new_spanned(
                    other,
                    "#[proxied] traits may only contain methods",
                ))
            }
        }
    }

    let vis = &item.vis;
    let interface_name = options.name.clone().unwrap_or_else(|| trait_ident.to_string());
    let upper = to_upper_snake(&trait_ident.to_string());
    let methods_ident = format_ident!("__CHIMERA_{}_METHODS", upper);
    let interface_ident = format_ident!("__CHIMERA_{}_INTERFACE", upper);
    let type_id_fn = format_ident!("__chimera_{}_type_id", upper.to_lowercase());

    let mut throws_statics = Vec::new();
    let mut descriptors = Vec::new();
    for (slot, method) in methods.iter().enumerate() {
        let name = method.sig.ident.to_string();
        let slot_lit = Literal::usize_unsuffixed(slot);
        let params = method.params.len();

        let mut descriptor = quote! {
            ::chimera_aop::Method::new(#interface_name, #name, #slot_lit).with_params(#params)
        };
        if method.variadic {
            descriptor.extend(quote!(.variadic()));
        }
        descriptor.extend(method.shape.descriptor(&trait_ident));
        if !method.throws.is_empty() {
            let throws_ident = format_ident!("__CHIMERA_{}_THROWS_{}", upper, slot);
            let count = method.throws.len();
            let kinds = &method.throws;
            throws_statics.push(quote! {
                static #throws_ident: [&'static ::chimera_aop::FaultKind; #count] = [#(&#kinds),*];
            });
            descriptor.extend(quote!(.throws(&#throws_ident)));
        }
        if method.sealed {
            descriptor.extend(quote!(.sealed()));
        }
        descriptors.push(descriptor);
    }

    let method_count = methods.len();
    let class_surface = if options.class_methods {
        quote!(.class_surface())
    } else {
        quote!()
    };

    let dispatch_arms = methods
        .iter()
        .enumerate()
        .map(|(slot, method)| dispatch_arm(slot, method));
    let proxy_methods: Vec<_> = methods
        .iter()
        .enumerate()
        .map(|(slot, method)| proxy_method(slot, method, &methods_ident, &trait_ident))
        .collect();

    Ok(quote! {
        #item

        #(#throws_statics)*

        #[doc(hidden)]
        #vis static #methods_ident: [::chimera_aop::Method; #method_count] = [#(#descriptors),*];

        #[doc(hidden)]
        fn #type_id_fn() -> ::std::any::TypeId {
            ::std::any::TypeId::of::<dyn #trait_ident>()
        }

        #[doc(hidden)]
        #vis static #interface_ident: ::chimera_aop::Interface =
            ::chimera_aop::Interface::new(#interface_name, &#methods_ident, #type_id_fn)#class_surface;

        impl ::chimera_aop::ProxyInterface for dyn #trait_ident {
            fn interface() -> &'static ::chimera_aop::Interface {
                &#interface_ident
            }

            fn dispatch(
                target: &Self,
                method: &'static ::chimera_aop::Method,
                args: &::chimera_aop::Arguments,
            ) -> ::chimera_aop::AopResult<::std::option::Option<::chimera_aop::Value>> {
                if !#interface_ident.declares(method) {
                    return ::std::result::Result::Err(::chimera_aop::AopError::MethodNotProxied {
                        method: method.to_string(),
                    });
                }
                match method.slot() {
                    #(#dispatch_arms)*
                    _ => ::std::result::Result::Err(::chimera_aop::AopError::MethodNotProxied {
                        method: method.to_string(),
                    }),
                }
            }

            fn from_proxy(
                proxy: ::std::sync::Arc<dyn ::chimera_aop::AopProxy>,
            ) -> ::chimera_aop::AopResult<::std::sync::Arc<Self>> {
                ::chimera_aop::ensure_exposes(&*proxy, &#interface_ident)?;
                let strategy = ::chimera_aop::AopProxy::strategy(&*proxy);
                let any = ::chimera_aop::AopProxy::into_any(proxy);
                let any = match any.downcast::<::chimera_aop::InterfaceProxy>() {
                    ::std::result::Result::Ok(proxy) => return ::std::result::Result::Ok(proxy as ::std::sync::Arc<Self>),
                    ::std::result::Result::Err(any) => any,
                };
                match any.downcast::<::chimera_aop::ClassProxy>() {
                    ::std::result::Result::Ok(proxy) => ::std::result::Result::Ok(proxy as ::std::sync::Arc<Self>),
                    ::std::result::Result::Err(_) => ::std::result::Result::Err(::chimera_aop::AopError::config(
                        ::std::format!("{} proxy cannot be viewed as [{}]", strategy, #interface_name),
                    )),
                }
            }
        }

        impl #trait_ident for ::chimera_aop::InterfaceProxy {
            #(#proxy_methods)*
        }

        impl #trait_ident for ::chimera_aop::ClassProxy {
            #(#proxy_methods)*
        }
    })
}

/// 确保 trait 对象满足 `Send + Sync + 'static`，并拒绝其他父 trait
fn check_supertraits(item: &mut ItemTrait) -> Result<()> {
    let mut has_send = false;
    let mut has_sync = false;
    let mut has_static = false;
    for bound in &item.supertraits {
        match bound {
            TypeParamBound::Trait(bound) if bound.path.is_ident("Send") => has_send = true,
            TypeParamBound::Trait(bound) if bound.path.is_ident("Sync") => has_sync = true,
            TypeParamBound::Lifetime(lifetime) if lifetime.ident == "static" => has_static = true,
            other => {
                return Err(Error::new_spanned(
                    other,
                    "#[proxied] traits may only have `Send`, `Sync` and `'static` as supertraits",
                ))
            }
        }
    }
    if item.colon_token.is_none() {
        item.colon_token = Some(Default::default());
    }
    if !has_send {
        item.supertraits.push(syn::parse_quote!(Send));
    }
    if !has_sync {
        item.supertraits.push(syn::parse_quote!(Sync));
    }
    if !has_static {
        item.supertraits.push(syn::parse_quote!('static));
    }
    Ok(())
}

fn parse_method(method: &mut TraitItemFn, trait_ident: &Ident) -> Result<ProxiedMethod> {
    let (throws, sealed) = take_helper_attrs(&mut method.attrs)?;
    let sig = &method.sig;

    if sig.asyncness.is_some() {
        return Err(Error::new_spanned(sig, "#[proxied] methods cannot be async"));
    }
    if !sig.generics.params.is_empty() {
        return Err(Error::new_spanned(&sig.generics, "#[proxied] methods cannot be generic"));
    }
    if sig.variadic.is_some() || sig.unsafety.is_some() || sig.abi.is_some() {
        return Err(Error::new_spanned(sig, "unsupported method signature for #[proxied]"));
    }

    let mut inputs = sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(receiver)) if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => {
            return Err(Error::new_spanned(
                sig,
                "#[proxied] methods must take `&self` as their receiver",
            ))
        }
    }

    let mut params = Vec::new();
    for input in inputs {
        let FnArg::Typed(pat) = input else {
            return Err(Error::new_spanned(input, "unexpected receiver"));
        };
        match &*pat.ty {
            Type::Reference(_) | Type::ImplTrait(_) | Type::Infer(_) => {
                return Err(Error::new_spanned(
                    &pat.ty,
                    "#[proxied] method parameters must be owned `'static` types",
                ))
            }
            ty => params.push(ty.clone()),
        }
    }
    let variadic = params
        .last()
        .and_then(last_segment_ident)
        .is_some_and(|ident| ident == "VarArgs");

    let shape = return_shape(&sig.output, trait_ident)?;

    Ok(ProxiedMethod {
        sig: sig.clone(),
        params,
        variadic,
        shape,
        throws,
        sealed,
    })
}

/// 取出并移除 `#[throws(..)]` 与 `#[sealed]`
fn take_helper_attrs(attrs: &mut Vec<Attribute>) -> Result<(Vec<Path>, bool)> {
    let mut throws = Vec::new();
    let mut sealed = false;
    let mut kept = Vec::with_capacity(attrs.len());
    for attr in attrs.drain(..) {
        if attr.path().is_ident("throws") {
            let kinds = attr.parse_args_with(Punctuated::<Path, Token![,]>::parse_terminated)?;
            throws.extend(kinds);
        } else if attr.path().is_ident("sealed") {
            sealed = true;
        } else {
            kept.push(attr);
        }
    }
    *attrs = kept;
    Ok((throws, sealed))
}

/// 返回类型必须是 `AopResult<T>` 或 `Result<T, AopError>`
fn return_shape(output: &ReturnType, trait_ident: &Ident) -> Result<Shape> {
    let ReturnType::Type(_, ty) = output else {
        return Err(Error::new(
            Span::call_site(),
            "#[proxied] methods must return `AopResult<T>`",
        ));
    };
    let wrapper = last_segment_ident(ty).map(|ident| ident.to_string());
    let inner = match (wrapper.as_deref(), generic_type_args(ty).first()) {
        (Some("AopResult" | "Result"), Some(inner)) => (*inner).clone(),
        _ => {
            return Err(Error::new_spanned(
                ty,
                "#[proxied] methods must return `AopResult<T>`",
            ))
        }
    };

    if is_unit(&inner) {
        return Ok(Shape::Unit);
    }
    let outer = last_segment_ident(&inner).map(|ident| ident.to_string());
    match (outer.as_deref(), generic_type_args(&inner).first()) {
        (Some("Option"), Some(value)) => Ok(Shape::Nullable((*value).clone())),
        (Some("Arc"), Some(object)) if dyn_trait_ident(object).is_some_and(|i| i == trait_ident) => {
            Ok(Shape::SelfRef)
        }
        _ => Ok(Shape::Value(inner)),
    }
}

fn type_name(ty: &Type) -> String {
    quote!(#ty).to_string().replace(' ', "")
}

fn arg_idents(count: usize) -> Vec<Ident> {
    (0..count).map(|i| format_ident!("__arg{}", i)).collect()
}

/// 目标侧：取出参数、调用目标方法、装箱返回值
fn dispatch_arm(slot: usize, method: &ProxiedMethod) -> TokenStream {
    let slot_lit = Literal::usize_unsuffixed(slot);
    let name = &method.sig.ident;
    let args = arg_idents(method.params.len());
    let indices: Vec<_> = (0..method.params.len()).map(Literal::usize_unsuffixed).collect();
    let types = &method.params;

    let call = quote!(target.#name(#(#args),*)?);
    let result = match &method.shape {
        Shape::Unit => quote! {
            #call;
            ::std::result::Result::Ok(::std::option::Option::None)
        },
        Shape::Value(_) => quote! {
            ::std::result::Result::Ok(::std::option::Option::Some(
                ::std::boxed::Box::new(#call) as ::chimera_aop::Value,
            ))
        },
        Shape::Nullable(_) => quote! {
            ::std::result::Result::Ok(#call.map(|value| ::std::boxed::Box::new(value) as ::chimera_aop::Value))
        },
        Shape::SelfRef => quote! {
            ::std::result::Result::Ok(::std::option::Option::Some(
                ::std::boxed::Box::new(::chimera_aop::ObjectRef::of(#call)) as ::chimera_aop::Value,
            ))
        },
    };

    quote! {
        #slot_lit => {
            #(let #args: #types = args.take(#indices, method)?;)*
            #result
        }
    }
}

/// 代理侧：打包参数、经过代理调用、转换返回值
fn proxy_method(slot: usize, method: &ProxiedMethod, methods_ident: &Ident, trait_ident: &Ident) -> TokenStream {
    let slot_lit = Literal::usize_unsuffixed(slot);
    let name = &method.sig.ident;
    let output = &method.sig.output;
    let args = arg_idents(method.params.len());
    let types = &method.params;

    let convert = match &method.shape {
        Shape::Unit => quote! {
            let _ = __value;
            ::std::result::Result::Ok(())
        },
        Shape::Value(ty) => quote!(::chimera_aop::value_of::<#ty>(__method, __value)),
        Shape::Nullable(ty) => quote!(::chimera_aop::nullable_of::<#ty>(__method, __value)),
        Shape::SelfRef => quote!(::chimera_aop::object_of::<dyn #trait_ident>(__method, __value)),
    };

    quote! {
        fn #name(&self, #(#args: #types),*) #output {
            let __method: &'static ::chimera_aop::Method = &#methods_ident[#slot_lit];
            let __args = ::chimera_aop::Arguments::new()#(.with(#args))*;
            let __value = ::chimera_aop::AopProxy::invoke(self, __method, __args)?;
            #convert
        }
    }
}
