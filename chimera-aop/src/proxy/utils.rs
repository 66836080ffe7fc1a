//! 代理工具函数

use super::AopProxy;
use crate::advised::AdvisedSupport;
use crate::arguments::data_address;
use crate::dispatch::Dispatch;
use crate::metadata::{markers, Interface, TargetClass};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 对象是否为引擎生成的代理
pub fn is_aop_proxy(object: &dyn Dispatch) -> bool {
    object.as_aop_proxy().is_some()
}

/// 穿过所有单例目标的代理层，返回最内层目标的类
pub fn ultimate_target_class(candidate: &Arc<dyn Dispatch>) -> Arc<TargetClass> {
    let mut current = Arc::clone(candidate);
    loop {
        let next = match current.as_aop_proxy().and_then(|proxy| proxy.advised()) {
            Some(advised) => {
                let source = advised.target_source();
                if !source.is_static() {
                    return source.target_class().unwrap_or_else(|| current.target_class());
                }
                match source.get_target() {
                    Ok(Some(target)) => target,
                    _ => return source.target_class().unwrap_or_else(|| current.target_class()),
                }
            }
            None => return current.target_class(),
        };
        current = next;
    }
}

/// 被代理装饰的最终目标类
pub fn decorated_class(advised: &AdvisedSupport) -> Option<Arc<TargetClass>> {
    let source = advised.target_source();
    if source.is_static() {
        if let Ok(Some(target)) = source.get_target() {
            return Some(ultimate_target_class(&target));
        }
    }
    source.target_class()
}

/// 代理实现的用户接口（去掉标记接口）
pub fn proxied_user_interfaces(proxy: &dyn AopProxy) -> Vec<&'static Interface> {
    proxy
        .proxied_interfaces()
        .iter()
        .copied()
        .filter(|i| !markers::is_marker(i))
        .collect()
}

/// 配置中没有用户声明的接口
pub fn has_no_user_supplied_interfaces(advised: &AdvisedSupport) -> bool {
    advised.interfaces().iter().all(|i| markers::is_marker(i))
}

/// 代理最终实现的接口
///
/// 没有声明接口而目标本身是接口代理时，沿用目标代理的用户接口。
/// 随后附加 `AopProxyMarker`、`Advised`（不透明代理除外）以及 `DecoratingProxy`。
pub fn complete_proxied_interfaces(advised: &AdvisedSupport, decorating: bool) -> Vec<&'static Interface> {
    let mut interfaces = advised.interfaces();
    if interfaces.is_empty() {
        if let Some(class) = advised.target_class() {
            if class.is_proxy_class() {
                interfaces.extend(class.user_interfaces());
            }
        }
    }

    let mut add = |interface: &'static Interface| {
        if !interfaces.iter().any(|i| *i == interface) {
            interfaces.push(interface);
        }
    };
    add(&markers::PROXY_MARKER);
    if !advised.is_opaque() {
        add(&markers::ADVISED);
    }
    if decorating {
        add(&markers::DECORATING_PROXY);
    }
    interfaces
}

/// 两个代理配置是否等价：接口、通知器和目标源都相同
pub fn equals_in_proxy(a: &AdvisedSupport, b: &AdvisedSupport) -> bool {
    if std::ptr::eq(a, b) {
        return true;
    }

    let (left, right) = (a.snapshot(), b.snapshot());
    left.interfaces == right.interfaces
        && left.advisors.len() == right.advisors.len()
        && left
            .advisors
            .iter()
            .zip(right.advisors.iter())
            .all(|(x, y)| data_address(x) == data_address(y))
        && left.target_source.same_source(right.target_source.as_ref())
}

/// 与 [`equals_in_proxy`] 一致的哈希：静态目标按目标地址，否则按目标源地址
pub fn proxy_hash(advised: &AdvisedSupport) -> u64 {
    let source = advised.target_source();
    let mut hasher = DefaultHasher::new();
    "AopProxy".hash(&mut hasher);
    if !source.is_static() {
        data_address(&source).hash(&mut hasher);
        return hasher.finish();
    }
    match source.get_target() {
        Ok(Some(target)) => data_address(&target).hash(&mut hasher),
        _ => source
            .target_class()
            .map(|class| class.name().to_string())
            .hash(&mut hasher),
    }
    hasher.finish()
}

/// 比较代理与另一个对象
///
/// 对方是代理时比较两者的配置；对方是不透明代理或普通对象时只比较地址。
pub(crate) fn proxy_equals(proxy: &dyn AopProxy, other: &dyn Dispatch) -> bool {
    let this = proxy as *const dyn AopProxy as *const ();
    if std::ptr::eq(this, other as *const dyn Dispatch as *const ()) {
        return true;
    }
    match (proxy.advised(), other.as_aop_proxy().and_then(|o| o.advised())) {
        (Some(a), Some(b)) => equals_in_proxy(a, b),
        _ => false,
    }
}
