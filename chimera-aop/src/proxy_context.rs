//! 当前代理上下文
//!
//! 开启 `expose-proxy` 后，调用期间可以在目标内部取得正在经过的代理，
//! 通过代理调用自身的其他方法，使这些调用同样经过拦截链。
//! 能够拿到 [`MethodInvocation`](crate::MethodInvocation) 的拦截器应直接使用
//! `invocation.proxy()`。

use crate::dispatch::ProxyInterface;
use crate::error::{AopError, AopResult};
use crate::proxy::AopProxy;
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static CURRENT_PROXY: RefCell<Option<Arc<dyn AopProxy>>> = RefCell::new(None);
}

/// 线程内的当前代理
pub struct ProxyContext;

impl ProxyContext {
    /// 当前代理；没有暴露代理时返回 [`AopError::ProxyNotExposed`]
    pub fn current_proxy() -> AopResult<Arc<dyn AopProxy>> {
        CURRENT_PROXY
            .with(|current| current.borrow().clone())
            .ok_or(AopError::ProxyNotExposed)
    }

    /// 以接口形式取得当前代理
    pub fn current<I: ?Sized + ProxyInterface>() -> AopResult<Arc<I>> {
        I::from_proxy(Self::current_proxy()?)
    }

    pub fn is_exposed() -> bool {
        CURRENT_PROXY.with(|current| current.borrow().is_some())
    }

    /// 设置当前代理，守卫析构时恢复之前的值（包括空值）
    pub(crate) fn expose(proxy: Option<Arc<dyn AopProxy>>) -> ExposedProxyGuard {
        let previous = CURRENT_PROXY.with(|current| current.replace(proxy));
        ExposedProxyGuard { previous }
    }
}

pub(crate) struct ExposedProxyGuard {
    previous: Option<Arc<dyn AopProxy>>,
}

impl Drop for ExposedProxyGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        // 线程结束阶段 thread_local 可能已销毁
        let _ = CURRENT_PROXY.try_with(|current| {
            *current.borrow_mut() = previous;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_exposed_is_an_error() {
        assert!(!ProxyContext::is_exposed());
        let err = ProxyContext::current_proxy().err().unwrap();
        assert!(matches!(err, AopError::ProxyNotExposed));
        assert!(err.to_string().contains("expose-proxy"));
    }

    #[test]
    fn test_guard_restores_absent_value() {
        {
            let _guard = ProxyContext::expose(None);
            assert!(!ProxyContext::is_exposed());
        }
        assert!(!ProxyContext::is_exposed());
    }
}
