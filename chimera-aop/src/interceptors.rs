//! 常用拦截器

use crate::advice::MethodInterceptor;
use crate::arguments::Value;
use crate::error::AopResult;
use crate::joinpoint::MethodInvocation;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// 记录方法进入与退出
#[derive(Debug, Clone, Default)]
pub struct TraceInterceptor {
    log_args: bool,
}

impl TraceInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进入时同时记录参数个数
    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }
}

impl MethodInterceptor for TraceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
        if self.log_args {
            tracing::info!(
                "→ Entering: {} ({} argument(s))",
                invocation.signature(),
                invocation.arguments().len()
            );
        } else {
            tracing::info!("→ Entering: {}", invocation.signature());
        }

        let result = invocation.proceed();
        match &result {
            Ok(_) => tracing::info!(
                "← Exiting: {} (took {:?})",
                invocation.signature(),
                invocation.elapsed()
            ),
            Err(e) => tracing::info!(
                "← Exiting: {} with error after {:?}: {}",
                invocation.signature(),
                invocation.elapsed(),
                e
            ),
        }
        result
    }

    fn describe(&self) -> String {
        "TraceInterceptor".to_string()
    }
}

/// 性能监控：超过阈值的调用记录警告
#[derive(Debug, Clone)]
pub struct PerformanceMonitorInterceptor {
    threshold: Duration,
}

impl PerformanceMonitorInterceptor {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

impl MethodInterceptor for PerformanceMonitorInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
        let result = invocation.proceed();
        let elapsed = invocation.elapsed();
        if elapsed > self.threshold {
            tracing::warn!(
                "⚠️ Slow method detected: {} took {:?} (threshold: {:?})",
                invocation.signature(),
                elapsed,
                self.threshold
            );
        } else {
            tracing::trace!("{} took {:?}", invocation.signature(), elapsed);
        }
        result
    }

    fn describe(&self) -> String {
        format!("PerformanceMonitorInterceptor({:?})", self.threshold)
    }
}

/// 记录方法抛出的错误，错误继续向上传播
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionLoggingInterceptor;

impl MethodInterceptor for ExceptionLoggingInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
        invocation.proceed().map_err(|e| {
            tracing::error!("❌ {} failed in {}: {}", e.kind(), invocation.signature(), e);
            e
        })
    }

    fn describe(&self) -> String {
        "ExceptionLoggingInterceptor".to_string()
    }
}

/// 统计经过的调用次数，并以 debug 级别记录每次调用
#[derive(Debug, Default)]
pub struct DebugInterceptor {
    count: AtomicUsize,
}

impl DebugInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}

impl MethodInterceptor for DebugInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Entering {:?} (call #{})", invocation, count);
        let result = invocation.proceed();
        tracing::debug!(
            "Exiting {} (call #{}, ok: {})",
            invocation.signature(),
            count,
            result.is_ok()
        );
        result
    }

    fn describe(&self) -> String {
        format!("DebugInterceptor(count: {})", self.count())
    }
}
