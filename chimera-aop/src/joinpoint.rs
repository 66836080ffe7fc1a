//! 连接点（JoinPoint）：一次方法调用的拦截链状态
//!
//! [`MethodInvocation`] 持有已解析的拦截链和游标。每次 `proceed()` 推进游标：
//! 链尾调用真实目标；延迟匹配条目用实际参数重新求值动态匹配器，
//! 不匹配时直接跳到下一个条目。

use crate::arguments::{Arguments, Value};
use crate::chain::{Chain, ChainEntry};
use crate::dispatch::{invoke_method, Dispatch};
use crate::error::{AopError, AopResult};
use crate::metadata::{Method, TargetClass};
use crate::proxy::AopProxy;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

type UserAttributes = Arc<Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>>;

/// 方法调用
pub struct MethodInvocation {
    proxy: Option<Arc<dyn AopProxy>>,
    target: Option<Arc<dyn Dispatch>>,
    method: &'static Method,
    arguments: Arguments,
    target_class: Arc<TargetClass>,
    chain: Chain,
    /// 下一个要执行的链条目
    position: usize,
    user_attributes: Option<UserAttributes>,
    started_at: Instant,
}

impl MethodInvocation {
    pub fn new(
        proxy: Option<Arc<dyn AopProxy>>,
        target: Option<Arc<dyn Dispatch>>,
        method: &'static Method,
        mut arguments: Arguments,
        target_class: Arc<TargetClass>,
        chain: Chain,
    ) -> Self {
        arguments.adapt_for(method);
        Self {
            proxy,
            target,
            method,
            arguments,
            target_class,
            chain,
            position: 0,
            user_attributes: None,
            started_at: Instant::now(),
        }
    }

    /// 执行下一个拦截器，链尾时调用目标方法
    pub fn proceed(&mut self) -> AopResult<Option<Value>> {
        let chain = Arc::clone(&self.chain);
        while let Some(entry) = chain.get(self.position) {
            self.position += 1;
            match entry {
                ChainEntry::Interceptor(interceptor) => return interceptor.invoke(self),
                ChainEntry::Dynamic {
                    interceptor,
                    matcher,
                } => {
                    if matcher.matches_with_args(self.method, &self.target_class, &self.arguments) {
                        return interceptor.invoke(self);
                    }
                    tracing::trace!(
                        "Dynamic matcher skipped interceptor at position {} for {}",
                        self.position - 1,
                        self.method
                    );
                }
            }
        }
        self.invoke_joinpoint()
    }

    fn invoke_joinpoint(&self) -> AopResult<Option<Value>> {
        match &self.target {
            Some(target) => invoke_method(target, self.method, &self.arguments),
            None => Err(AopError::MissingTarget {
                method: self.method.to_string(),
            }),
        }
    }

    /// 复制一个可以独立执行的调用
    ///
    /// 副本尚未执行过 `proceed()`，从当前拦截器之后的条目开始，
    /// 因此在拦截器内对每个副本调用一次 `proceed()` 就会重新执行剩余的链和目标方法。
    /// 用户属性在副本之间共享。
    pub fn invocable_clone(&mut self) -> MethodInvocation {
        let arguments = self.arguments.clone();
        self.invocable_clone_with(arguments)
    }

    /// 与 [`invocable_clone`](Self::invocable_clone) 相同，但使用新的参数
    pub fn invocable_clone_with(&mut self, mut arguments: Arguments) -> MethodInvocation {
        arguments.adapt_for(self.method);
        let attributes = Arc::clone(self.attributes());
        MethodInvocation {
            proxy: self.proxy.clone(),
            target: self.target.clone(),
            method: self.method,
            arguments,
            target_class: Arc::clone(&self.target_class),
            chain: Arc::clone(&self.chain),
            position: self.position,
            user_attributes: Some(attributes),
            started_at: Instant::now(),
        }
    }

    fn attributes(&mut self) -> &UserAttributes {
        self.user_attributes
            .get_or_insert_with(|| Arc::new(Mutex::new(HashMap::new())))
    }

    pub fn method(&self) -> &'static Method {
        self.method
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn arguments_mut(&mut self) -> &mut Arguments {
        &mut self.arguments
    }

    pub fn set_arguments(&mut self, mut arguments: Arguments) {
        arguments.adapt_for(self.method);
        self.arguments = arguments;
    }

    /// 目标对象；使用空目标源时为 `None`
    pub fn this(&self) -> Option<&Arc<dyn Dispatch>> {
        self.target.as_ref()
    }

    /// 当前调用所经过的代理
    ///
    /// 与 [`ProxyContext`](crate::ProxyContext) 不同，不依赖 `expose-proxy`。
    pub fn proxy(&self) -> Option<&Arc<dyn AopProxy>> {
        self.proxy.as_ref()
    }

    pub fn target_class(&self) -> &Arc<TargetClass> {
        &self.target_class
    }

    pub fn user_attribute(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.user_attributes
            .as_ref()
            .and_then(|attrs| attrs.lock().get(key).cloned())
    }

    pub fn set_user_attribute(&mut self, key: impl Into<String>, value: impl Any + Send + Sync) {
        self.attributes().lock().insert(key.into(), Arc::new(value));
    }

    pub fn remove_user_attribute(&mut self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.user_attributes
            .as_ref()
            .and_then(|attrs| attrs.lock().remove(key))
    }

    /// 调用开始至今的耗时
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// `声明接口.方法名`
    pub fn signature(&self) -> String {
        self.method.to_string()
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }
}

impl fmt::Debug for MethodInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("method", &self.signature())
            .field("target_class", &self.target_class.name())
            .field("arguments", &self.arguments)
            .field("position", &self.position)
            .field("chain_len", &self.chain.len())
            .finish()
    }
}

impl fmt::Display for MethodInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}
