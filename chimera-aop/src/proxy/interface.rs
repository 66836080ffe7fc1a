//! 接口代理

use super::support;
use super::{utils, AopProxy, ProxyStrategy};
use crate::advised::AdvisedSupport;
use crate::arguments::{value_of, Arguments, Value};
use crate::dispatch::Dispatch;
use crate::error::{AopError, AopResult};
use crate::metadata::{markers, Interface, Method, TargetClass};
use std::any::Any;
use std::sync::{Arc, Weak};

/// 基于接口分派表的代理
///
/// 只接受代理接口（含标记接口）声明的方法。`Advised` 与 `DecoratingProxy` 的方法直接
/// 由配置回答，其余方法经过拦截链。目标类自行定义的相等和哈希同样经过拦截链，
/// 没有定义时由代理按配置比较。
pub struct InterfaceProxy {
    advised: Arc<AdvisedSupport>,
    interfaces: Vec<&'static Interface>,
    class: Arc<TargetClass>,
    equals_defined: bool,
    hash_defined: bool,
    me: Weak<InterfaceProxy>,
}

impl InterfaceProxy {
    pub fn new(advised: Arc<AdvisedSupport>) -> Arc<Self> {
        let interfaces = utils::complete_proxied_interfaces(&advised, true);
        let target_class = advised.target_class();
        let (equals_defined, hash_defined) = target_class
            .as_ref()
            .map_or((false, false), |c| (c.defines_equality(), c.defines_hash()));

        let names: Vec<_> = interfaces.iter().map(|i| i.name()).collect();
        let class = interfaces
            .iter()
            .copied()
            .fold(TargetClass::new(format!("$Proxy<{}>", names.join(", "))), TargetClass::implements)
            .mark_proxy_class();

        tracing::info!(
            "Creating interface proxy for target [{}] with interfaces {:?}",
            target_class.as_ref().map_or("<none>", |c| c.name()),
            names
        );

        Arc::new_cyclic(|me| Self {
            advised,
            interfaces,
            class: Arc::new(class),
            equals_defined,
            hash_defined,
            me: me.clone(),
        })
    }

    fn this(&self) -> Option<Arc<dyn AopProxy>> {
        self.me.upgrade().map(|proxy| proxy as Arc<dyn AopProxy>)
    }

    fn invoke_identity(&self, method: &'static Method, args: Arguments) -> AopResult<Option<Value>> {
        support::invoke_advised(&self.advised, self.this(), method, args)
    }
}

impl Dispatch for InterfaceProxy {
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
        if !self.equals_defined {
            return utils::proxy_equals(self, other.as_ref());
        }
        let method = markers::equals_method();
        let args = Arguments::new().with(Arc::clone(other));
        match self
            .invoke_identity(method, args)
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
        if !self.hash_defined {
            return utils::proxy_hash(&self.advised);
        }
        let method = markers::hash_code_method();
        match self
            .invoke_identity(method, Arguments::new())
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

impl AopProxy for InterfaceProxy {
    fn invoke(&self, method: &'static Method, args: Arguments) -> AopResult<Option<Value>> {
        if !self.interfaces.iter().any(|i| i.declares(method)) {
            return Err(AopError::MethodNotProxied {
                method: method.to_string(),
            });
        }
        if let Some(answer) = support::answer_marker(&self.advised, method, || self.decorated_class()) {
            return answer;
        }
        support::invoke_advised(&self.advised, self.this(), method, args)
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
        ProxyStrategy::Interface
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn as_dispatch(self: Arc<Self>) -> Arc<dyn Dispatch> {
        self
    }
}
