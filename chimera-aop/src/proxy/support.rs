//! 两种代理策略共用的调用路径

use super::AopProxy;
use crate::advised::{AdvisedSupport, Snapshot};
use crate::arguments::{Arguments, ObjectRef, Value};
use crate::chain::Chain;
use crate::dispatch::{invoke_method, Dispatch};
use crate::error::{AopError, AopResult};
use crate::joinpoint::MethodInvocation;
use crate::metadata::{markers, Method, ReturnType, TargetClass};
use crate::proxy_context::{ExposedProxyGuard, ProxyContext};
use crate::target_source::TargetSource;
use std::sync::Arc;

/// 一次调用期间持有的目标，析构时归还给非静态目标源
pub(crate) struct TargetLease {
    source: Arc<dyn TargetSource>,
    target: Option<Arc<dyn Dispatch>>,
}

impl TargetLease {
    pub(crate) fn acquire(source: &Arc<dyn TargetSource>) -> AopResult<Self> {
        let target = source.get_target()?;
        Ok(Self {
            source: Arc::clone(source),
            target,
        })
    }

    pub(crate) fn target(&self) -> Option<&Arc<dyn Dispatch>> {
        self.target.as_ref()
    }
}

impl Drop for TargetLease {
    fn drop(&mut self) {
        if self.source.is_static() {
            return;
        }
        if let Some(target) = self.target.take() {
            if let Err(e) = self.source.release_target(target) {
                tracing::warn!("Failed to release target to {}: {}", self.source.describe(), e);
            }
        }
    }
}

pub(crate) fn expose_if(advised: &AdvisedSupport, proxy: &Option<Arc<dyn AopProxy>>) -> Option<ExposedProxyGuard> {
    if advised.is_expose_proxy() {
        Some(ProxyContext::expose(proxy.clone()))
    } else {
        None
    }
}

/// 经过配置的拦截链完成一次调用
pub(crate) fn invoke_advised(
    advised: &AdvisedSupport,
    proxy: Option<Arc<dyn AopProxy>>,
    method: &'static Method,
    args: Arguments,
) -> AopResult<Option<Value>> {
    let snapshot: Arc<Snapshot> = advised.snapshot();
    let _exposed = expose_if(advised, &proxy);
    let lease = TargetLease::acquire(&snapshot.target_source)?;

    let target_class = lease
        .target()
        .map(|target| target.target_class())
        .or_else(|| snapshot.target_source.target_class())
        .unwrap_or_else(|| Arc::new(TargetClass::new(method.declaring())));

    let chain = advised.chain_for(&snapshot, method, Some(&target_class))?;
    let result = run_chain(proxy.clone(), lease.target().cloned(), method, args, &target_class, chain);

    finish(proxy.as_ref(), lease.target(), &target_class, method, result)
}

/// 执行拦截链；空链直接调用目标
pub(crate) fn run_chain(
    proxy: Option<Arc<dyn AopProxy>>,
    target: Option<Arc<dyn Dispatch>>,
    method: &'static Method,
    mut args: Arguments,
    target_class: &Arc<TargetClass>,
    chain: Chain,
) -> AopResult<Option<Value>> {
    if chain.is_empty() {
        args.adapt_for(method);
        return invoke_target(target.as_ref(), method, &args);
    }

    tracing::trace!("Invoking {} through {} interceptor(s)", method, chain.len());
    MethodInvocation::new(proxy, target, method, args, Arc::clone(target_class), chain).proceed()
}

pub(crate) fn invoke_target(
    target: Option<&Arc<dyn Dispatch>>,
    method: &'static Method,
    args: &Arguments,
) -> AopResult<Option<Value>> {
    match target {
        Some(target) => invoke_method(target, method, args),
        None => Err(AopError::MissingTarget {
            method: method.to_string(),
        }),
    }
}

/// 处理返回值与错误
///
/// 目标返回自身时替换为代理（目标类要求原始引用时除外）；非空返回类型得到空值是调用错误；
/// 方法签名未声明的受检故障包装为 [`AopError::UndeclaredThrowable`]。
pub(crate) fn finish(
    proxy: Option<&Arc<dyn AopProxy>>,
    target: Option<&Arc<dyn Dispatch>>,
    target_class: &TargetClass,
    method: &'static Method,
    result: AopResult<Option<Value>>,
) -> AopResult<Option<Value>> {
    let value = result.map_err(|e| translate_undeclared(method, e))?;

    match value {
        None if method.return_type() == ReturnType::Value || method.return_type() == ReturnType::SelfRef => {
            Err(AopError::NullReturn {
                method: method.to_string(),
            })
        }
        Some(value) if method.return_type() == ReturnType::SelfRef => {
            Ok(Some(substitute_self(proxy, target, target_class, method, value)))
        }
        other => Ok(other),
    }
}

fn substitute_self(
    proxy: Option<&Arc<dyn AopProxy>>,
    target: Option<&Arc<dyn Dispatch>>,
    target_class: &TargetClass,
    method: &'static Method,
    value: Value,
) -> Value {
    if target_class.has_raw_target_access() {
        return value;
    }
    let (proxy, target) = match (proxy, target) {
        (Some(proxy), Some(target)) => (proxy, target),
        _ => return value,
    };
    match value.downcast_ref::<ObjectRef>() {
        Some(object) if object.is_same_as(target) => {
            tracing::trace!("Replacing returned target with proxy for {}", method);
            Box::new(ObjectRef::proxy(Arc::clone(proxy)))
        }
        _ => value,
    }
}

fn translate_undeclared(method: &'static Method, error: AopError) -> AopError {
    match error {
        AopError::Fault(fault) if fault.is_checked() && !method.declares(fault.kind()) => {
            AopError::UndeclaredThrowable {
                method: method.to_string(),
                fault: Box::new(fault),
            }
        }
        other => other,
    }
}

/// 直接回答 `Advised` / `DecoratingProxy` 标记接口的方法，其他方法返回 `None`
pub(crate) fn answer_marker(
    advised: &AdvisedSupport,
    method: &'static Method,
    decorated: impl FnOnce() -> Option<Arc<TargetClass>>,
) -> Option<AopResult<Option<Value>>> {
    if markers::ADVISED.declares(method) {
        let value: Option<Value> = match method.name() {
            "is_frozen" => Some(Box::new(advised.is_frozen())),
            "is_expose_proxy" => Some(Box::new(advised.is_expose_proxy())),
            "is_proxy_target_class" => Some(Box::new(advised.is_proxy_target_class())),
            "advisor_count" => Some(Box::new(advised.advisor_count())),
            "target_class_name" => advised
                .target_class()
                .map(|class| Box::new(class.name().to_string()) as Value),
            "to_proxy_config_string" => Some(Box::new(advised.to_proxy_config_string())),
            _ => {
                return Some(Err(AopError::MethodNotProxied {
                    method: method.to_string(),
                }))
            }
        };
        return Some(Ok(value));
    }
    if markers::DECORATING_PROXY.declares(method) {
        return Some(Ok(decorated().map(|class| Box::new(class.name().to_string()) as Value)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{kinds, Fault, FaultKind};

    static DECLARED: [&FaultKind; 1] = [&kinds::IO];
    static READ: Method = Method::new("Files", "read", 0)
        .returns(ReturnType::Value, "String")
        .throws(&DECLARED);
    static TOUCH: Method = Method::new("Files", "touch", 1);

    fn class() -> TargetClass {
        TargetClass::new("Files")
    }

    #[test]
    fn test_null_for_non_nullable_return_is_an_error() {
        let result = finish(None, None, &class(), &READ, Ok(None));
        assert!(matches!(result, Err(AopError::NullReturn { .. })));
        assert!(finish(None, None, &class(), &TOUCH, Ok(None)).unwrap().is_none());
    }

    #[test]
    fn test_undeclared_checked_fault_is_wrapped() {
        let checked = Fault::new(&kinds::EXCEPTION, "boom");
        let result = finish(None, None, &class(), &TOUCH, Err(checked.into()));
        match result {
            Err(AopError::UndeclaredThrowable { fault, .. }) => assert_eq!(fault.message(), "boom"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }

        let declared = Fault::new(&kinds::IO, "disk");
        assert!(matches!(
            finish(None, None, &class(), &READ, Err(declared.into())),
            Err(AopError::Fault(_))
        ));

        let unchecked = Fault::new(&kinds::ILLEGAL_STATE, "state");
        assert!(matches!(
            finish(None, None, &class(), &TOUCH, Err(unchecked.into())),
            Err(AopError::Fault(_))
        ));
    }
}
