//! 委托式引入

use crate::advice::IntroductionInterceptor;
use crate::arguments::{ObjectRef, Value};
use crate::dispatch::Dispatch;
use crate::error::AopResult;
use crate::joinpoint::MethodInvocation;
use crate::metadata::Interface;
use std::sync::Arc;

/// 把引入接口的方法转给委托对象，其他方法继续执行拦截链
///
/// 委托对象实现的全部用户接口默认都会被引入，可以用 [`suppress_interface`](Self::suppress_interface)
/// 排除其中一部分。委托方法返回委托对象本身时，返回值替换为代理。
pub struct DelegatingIntroductionInterceptor {
    delegate: Arc<dyn Dispatch>,
    interfaces: Vec<&'static Interface>,
}

impl DelegatingIntroductionInterceptor {
    pub fn new(delegate: Arc<dyn Dispatch>) -> Self {
        let interfaces = delegate.target_class().user_interfaces().collect();
        Self { delegate, interfaces }
    }

    pub fn suppress_interface(mut self, interface: &Interface) -> Self {
        self.interfaces.retain(|i| *i != interface);
        self
    }

    pub fn interfaces(&self) -> &[&'static Interface] {
        &self.interfaces
    }

    pub fn delegate(&self) -> &Arc<dyn Dispatch> {
        &self.delegate
    }
}

impl IntroductionInterceptor for DelegatingIntroductionInterceptor {
    fn implements_interface(&self, interface: &Interface) -> bool {
        self.interfaces.iter().any(|i| *i == interface)
    }

    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
        let method = invocation.method();
        if !self.interfaces.iter().any(|i| i.declares(method)) {
            return invocation.proceed();
        }

        let value = self.delegate.dispatch(method, invocation.arguments())?;
        let replaced = match (&value, invocation.proxy()) {
            (Some(v), Some(proxy)) => v
                .downcast_ref::<ObjectRef>()
                .filter(|object| object.is_same_as(&self.delegate))
                .map(|_| Box::new(ObjectRef::proxy(Arc::clone(proxy))) as Value),
            _ => None,
        };
        Ok(replaced.or(value))
    }

    fn describe(&self) -> String {
        let names: Vec<_> = self.interfaces.iter().map(|i| i.name()).collect();
        format!("DelegatingIntroductionInterceptor{:?}", names)
    }
}
