//! 工具函数

use proc_macro2::Ident;
use syn::{GenericArgument, PathArguments, Type, TypePath};

/// 类型路径的最后一段标识符，例如 `std::sync::Arc<T>` 得到 `Arc`
pub fn last_segment_ident(ty: &Type) -> Option<&Ident> {
    match ty {
        Type::Path(TypePath { qself: None, path }) => path.segments.last().map(|s| &s.ident),
        Type::Group(group) => last_segment_ident(&group.elem),
        Type::Paren(paren) => last_segment_ident(&paren.elem),
        _ => None,
    }
}

/// 类型路径最后一段的泛型类型参数
pub fn generic_type_args(ty: &Type) -> Vec<&Type> {
    let segment = match ty {
        Type::Path(TypePath { qself: None, path }) => path.segments.last(),
        Type::Group(group) => return generic_type_args(&group.elem),
        _ => None,
    };
    match segment.map(|s| &s.arguments) {
        Some(PathArguments::AngleBracketed(args)) => args
            .args
            .iter()
            .filter_map(|arg| match arg {
                GenericArgument::Type(ty) => Some(ty),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// `()`
pub fn is_unit(ty: &Type) -> bool {
    matches!(ty, Type::Tuple(tuple) if tuple.elems.is_empty())
}

/// `dyn Name` 或 `dyn Name + Send + ...` 中的首个 trait 名
pub fn dyn_trait_ident(ty: &Type) -> Option<&Ident> {
    match ty {
        Type::TraitObject(object) => object.bounds.iter().find_map(|bound| match bound {
            syn::TypeParamBound::Trait(bound) => bound.path.segments.last().map(|s| &s.ident),
            _ => None,
        }),
        Type::Group(group) => dyn_trait_ident(&group.elem),
        Type::Paren(paren) => dyn_trait_ident(&paren.elem),
        _ => None,
    }
}

/// 驼峰名转为全大写蛇形，例如 `OrderService` 得到 `ORDER_SERVICE`
pub fn to_upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(ch.to_uppercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_helpers() {
        let ty: Type = syn::parse_quote!(std::sync::Arc<dyn Counter + Send>);
        assert_eq!(last_segment_ident(&ty).unwrap(), "Arc");
        let args = generic_type_args(&ty);
        assert_eq!(args.len(), 1);
        assert_eq!(dyn_trait_ident(args[0]).unwrap(), "Counter");

        assert!(is_unit(&syn::parse_quote!(())));
        assert!(!is_unit(&syn::parse_quote!(u8)));
    }

    #[test]
    fn test_to_upper_snake() {
        assert_eq!(to_upper_snake("OrderService"), "ORDER_SERVICE");
        assert_eq!(to_upper_snake("Ping"), "PING");
    }
}
