//! 子类代理
//!
//! 以目标类声明的全部方法（类方法面与接口方法）建立槽位，生成时为每个方法决定调用方式：
//!
//! | 槽位 | 条件 | 行为 |
//! |---|---|---|
//! | `Advised` | 默认 | 每次调用从配置缓存取拦截链 |
//! | `Fixed` | 静态目标、已冻结、不暴露代理、有通知 | 生成时计算好的拦截链与目标 |
//! | `Direct` | 静态目标、已冻结、不暴露代理、无通知 | 直接调用目标 |
//! | `AdvisedAccess` | `Advised` 接口方法 | 由配置直接回答 |
//! | `Final` | 方法不可覆盖 | 不经过拦截链直接调用目标 |
//!
//! 相等与哈希另有两个槽位：目标类自行定义时按上表为其建立方法槽位并经过拦截链，
//! 否则由代理按配置比较。

use super::support::{self, TargetLease};
use super::{utils, AopProxy, ProxyStrategy};
use crate::advised::AdvisedSupport;
use crate::arguments::{value_of, Arguments, Value};
use crate::chain::Chain;
use crate::dispatch::{invoke_method, Dispatch};
use crate::error::{AopError, AopResult};
use crate::metadata::{markers, Constructor, Interface, Method, MethodKey, TargetClass};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

enum Slot {
    Advised,
    Fixed {
        chain: Chain,
        target: Arc<dyn Dispatch>,
    },
    Direct(Arc<dyn Dispatch>),
    AdvisedAccess,
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdentitySlot {
    Proxy,
    Target,
}

/// 子类代理
pub struct ClassProxy {
    advised: Arc<AdvisedSupport>,
    target_class: Arc<TargetClass>,
    class: Arc<TargetClass>,
    interfaces: Vec<&'static Interface>,
    slots: HashMap<MethodKey, Slot>,
    equals: IdentitySlot,
    hash: IdentitySlot,
    constructor_args: Option<Arguments>,
    me: Weak<ClassProxy>,
}

impl ClassProxy {
    /// 生成子类代理
    ///
    /// final 类、没有可访问构造器、或者构造参数与构造器不符时返回
    /// [`AopError::ProxyGeneration`]。
    pub fn new(advised: Arc<AdvisedSupport>, constructor_args: Option<Arguments>) -> AopResult<Arc<Self>> {
        let target_class = advised.target_class().ok_or(AopError::NoTargetClass)?;
        validate_class(&target_class, constructor_args.as_ref())?;

        let mut interfaces: Vec<&'static Interface> = target_class
            .class_method_surfaces()
            .iter()
            .chain(target_class.interfaces().iter())
            .copied()
            .collect();
        for interface in utils::complete_proxied_interfaces(&advised, false) {
            if !interfaces.iter().any(|i| *i == interface) {
                interfaces.push(interface);
            }
        }

        let slots = build_slots(&advised, &target_class, &interfaces)?;
        let class = interfaces.iter().copied().fold(
            TargetClass::new(format!("{}$$ChimeraProxy", target_class.name())),
            TargetClass::implements,
        );
        let identity = |defined: bool| if defined { IdentitySlot::Target } else { IdentitySlot::Proxy };

        tracing::info!(
            "Creating class proxy for [{}] with {} method slot(s)",
            target_class,
            slots.len()
        );

        Ok(Arc::new_cyclic(|me| Self {
            equals: identity(target_class.defines_equality()),
            hash: identity(target_class.defines_hash()),
            advised,
            target_class,
            class: Arc::new(class),
            interfaces,
            slots,
            constructor_args,
            me: me.clone(),
        }))
    }

    /// 生成代理时提供的构造参数
    pub fn constructor_args(&self) -> Option<&Arguments> {
        self.constructor_args.as_ref()
    }

    /// 固化了拦截链的槽位数
    pub fn fixed_slot_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, Slot::Fixed { .. } | Slot::Direct(_)))
            .count()
    }

    fn this(&self) -> Option<Arc<dyn AopProxy>> {
        self.me.upgrade().map(|proxy| proxy as Arc<dyn AopProxy>)
    }

    fn not_proxied(method: &'static Method) -> AopError {
        AopError::MethodNotProxied {
            method: method.to_string(),
        }
    }
}

fn validate_class(class: &TargetClass, constructor_args: Option<&Arguments>) -> AopResult<()> {
    let fail = |reason: String| AopError::ProxyGeneration {
        class: class.name().to_string(),
        reason,
    };

    if class.is_final() {
        return Err(fail("cannot subclass final class".to_string()));
    }
    let given = constructor_args.map_or(0, Arguments::len);
    match class.constructor_kind() {
        Constructor::Inaccessible => Err(fail("no visible constructor".to_string())),
        Constructor::Default if given > 0 => Err(fail(format!(
            "default constructor takes no arguments but {} were given",
            given
        ))),
        Constructor::WithArgs(expected) if constructor_args.is_none() => Err(fail(format!(
            "constructor requires {} argument(s) but no constructor arguments were given",
            expected
        ))),
        Constructor::WithArgs(expected) if expected != given => Err(fail(format!(
            "constructor requires {} argument(s) but {} were given",
            expected, given
        ))),
        _ => Ok(()),
    }
}

fn build_slots(
    advised: &AdvisedSupport,
    target_class: &TargetClass,
    interfaces: &[&'static Interface],
) -> AopResult<HashMap<MethodKey, Slot>> {
    let source = advised.target_source();
    let fixed = advised.is_frozen() && source.is_static() && !advised.is_expose_proxy();
    let fixed_target = if fixed { source.get_target()? } else { None };

    let mut slots = HashMap::new();
    for interface in interfaces {
        if markers::is_marker(interface) {
            if *interface == &markers::ADVISED {
                for method in interface.methods() {
                    slots.insert(method.key(), Slot::AdvisedAccess);
                }
            }
            continue;
        }

        for method in interface.methods() {
            slots.insert(method.key(), method_slot(advised, target_class, fixed_target.as_ref(), method)?);
        }
    }

    let identity = [
        (target_class.defines_equality(), markers::equals_method()),
        (target_class.defines_hash(), markers::hash_code_method()),
    ];
    for (_, method) in identity.into_iter().filter(|(defined, _)| *defined) {
        slots.insert(method.key(), method_slot(advised, target_class, fixed_target.as_ref(), method)?);
    }
    Ok(slots)
}

fn method_slot(
    advised: &AdvisedSupport,
    target_class: &TargetClass,
    fixed_target: Option<&Arc<dyn Dispatch>>,
    method: &'static Method,
) -> AopResult<Slot> {
    if method.is_final() {
        tracing::warn!(
            "Final method [{}] of [{}] cannot be intercepted: calls go straight to the target",
            method,
            target_class
        );
        return Ok(Slot::Final);
    }
    let Some(target) = fixed_target else {
        return Ok(Slot::Advised);
    };
    let chain = advised.get_interceptor_chain(method, Some(target_class))?;
    if chain.is_empty() {
        Ok(Slot::Direct(Arc::clone(target)))
    } else {
        Ok(Slot::Fixed {
            chain,
            target: Arc::clone(target),
        })
    }
}

impl Dispatch for ClassProxy {
    fn target_class(&self) -> Arc<TargetClass> {
        Arc::clone(&self.class)
    }

    fn dispatch(&self, method: &'static Method, args: &Arguments) -> AopResult<Option<Value>> {
        self.invoke(method, args.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_aop_proxy(&self) -> Option<&dyn AopProxy> {
        Some(self)
    }

    fn equals(&self, other: &Arc<dyn Dispatch>) -> bool {
        if self.equals == IdentitySlot::Proxy {
            return utils::proxy_equals(self, other.as_ref());
        }
        let method = markers::equals_method();
        match self
            .invoke(method, Arguments::new().with(Arc::clone(other)))
            .and_then(|value| value_of::<bool>(method, value))
        {
            Ok(equal) => equal,
            Err(e) => {
                tracing::warn!("Equality check through proxy failed: {}", e);
                false
            }
        }
    }

    fn hash_code(&self) -> u64 {
        if self.hash == IdentitySlot::Proxy {
            return utils::proxy_hash(&self.advised);
        }
        let method = markers::hash_code_method();
        match self
            .invoke(method, Arguments::new())
            .and_then(|value| value_of::<u64>(method, value))
        {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!("Hash code through proxy failed: {}", e);
                utils::proxy_hash(&self.advised)
            }
        }
    }
}

impl AopProxy for ClassProxy {
    fn invoke(&self, method: &'static Method, mut args: Arguments) -> AopResult<Option<Value>> {
        let slot = self
            .slots
            .get(&method.key())
            .ok_or_else(|| Self::not_proxied(method))?;

        match slot {
            Slot::Advised => support::invoke_advised(&self.advised, self.this(), method, args),
            Slot::Fixed { chain, target } => {
                let proxy = self.this();
                let result = support::run_chain(
                    proxy.clone(),
                    Some(Arc::clone(target)),
                    method,
                    args,
                    &self.target_class,
                    Arc::clone(chain),
                );
                support::finish(proxy.as_ref(), Some(target), &self.target_class, method, result)
            }
            Slot::Direct(target) => {
                args.adapt_for(method);
                let result = invoke_method(target, method, &args);
                support::finish(self.this().as_ref(), Some(target), &self.target_class, method, result)
            }
            Slot::AdvisedAccess => support::answer_marker(&self.advised, method, || None)
                .unwrap_or_else(|| Err(Self::not_proxied(method))),
            Slot::Final => {
                let lease = TargetLease::acquire(&self.advised.target_source())?;
                args.adapt_for(method);
                support::invoke_target(lease.target(), method, &args)
            }
        }
    }

    fn advised(&self) -> Option<&Arc<AdvisedSupport>> {
        if self.advised.is_opaque() {
            None
        } else {
            Some(&self.advised)
        }
    }

    fn proxied_interfaces(&self) -> &[&'static Interface] {
        &self.interfaces
    }

    fn decorated_class(&self) -> Option<Arc<TargetClass>> {
        utils::decorated_class(&self.advised)
    }

    fn strategy(&self) -> ProxyStrategy {
        ProxyStrategy::Class
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn as_dispatch(self: Arc<Self>) -> Arc<dyn Dispatch> {
        self
    }
}
