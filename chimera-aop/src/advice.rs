//! 通知（Advice）定义
//!
//! 通知是一组封闭的形态：环绕拦截器、前置、返回后、后置（finally）、异常、引入，
//! 以及需要自定义适配器才能识别的 [`CustomAdvice`]。
//! 除环绕拦截器外，其余形态都由 [`AdviceAdapterRegistry`](crate::AdviceAdapterRegistry)
//! 转换为统一的 [`MethodInterceptor`]。

use crate::arguments::{data_address, Arguments, Value};
use crate::dispatch::Dispatch;
use crate::error::{AopError, AopResult};
use crate::fault::FaultKind;
use crate::joinpoint::MethodInvocation;
use crate::metadata::{Interface, Method};
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdviceType {
    /// 环绕通知（可以控制方法执行）
    Around,
    /// 前置通知
    Before,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 异常通知（抛出异常时执行）
    AfterThrowing,
    /// 引入通知（为代理增加新接口）
    Introduction,
    /// 自定义通知
    Custom,
}

/// 环绕拦截器，拦截链的统一形态
///
/// 实现必须调用 `invocation.proceed()` 才会继续执行后续拦截器和目标方法。
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>>;

    fn describe(&self) -> String {
        type_name::<Self>().to_string()
    }
}

/// 前置通知
pub trait MethodBeforeAdvice: Send + Sync {
    /// 返回错误会阻止目标方法执行
    fn before(
        &self,
        method: &'static Method,
        args: &Arguments,
        target: Option<&Arc<dyn Dispatch>>,
    ) -> AopResult<()>;

    fn describe(&self) -> String {
        type_name::<Self>().to_string()
    }
}

/// 返回后通知
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(
        &self,
        value: Option<&(dyn Any + Send)>,
        method: &'static Method,
        args: &Arguments,
        target: Option<&Arc<dyn Dispatch>>,
    ) -> AopResult<()>;

    fn describe(&self) -> String {
        type_name::<Self>().to_string()
    }
}

/// 后置通知（finally 语义）
pub trait AfterAdvice: Send + Sync {
    fn after(
        &self,
        method: &'static Method,
        args: &Arguments,
        target: Option<&Arc<dyn Dispatch>>,
    ) -> AopResult<()>;

    fn describe(&self) -> String {
        type_name::<Self>().to_string()
    }
}

/// 引入拦截器：为代理增加目标本身没有实现的接口
pub trait IntroductionInterceptor: Send + Sync {
    fn implements_interface(&self, interface: &Interface) -> bool;

    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>>;

    fn describe(&self) -> String {
        type_name::<Self>().to_string()
    }
}

/// 其他通知形态，需要注册对应的 [`AdvisorAdapter`](crate::AdvisorAdapter)
pub trait CustomAdvice: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn describe(&self) -> String {
        type_name::<Self>().to_string()
    }
}

/// 异常处理函数
pub type ThrowsHandler = Arc<dyn Fn(&Method, &Arguments, &AopError) + Send + Sync>;

/// 异常通知：按故障类型登记的处理函数表
///
/// 处理函数执行后原错误继续向上传播。查找时沿故障类型的父类链向上，
/// 取第一个登记过的类型。
#[derive(Clone, Default)]
pub struct ThrowsAdvice {
    name: String,
    handlers: Vec<(&'static FaultKind, ThrowsHandler)>,
}

impl ThrowsAdvice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: Vec::new(),
        }
    }

    /// 登记处理函数，同一类型重复登记时后者覆盖前者
    pub fn on<F>(mut self, kind: &'static FaultKind, handler: F) -> Self
    where
        F: Fn(&Method, &Arguments, &AopError) + Send + Sync + 'static,
    {
        self.handlers.retain(|(k, _)| !std::ptr::eq(*k, kind));
        self.handlers.push((kind, Arc::new(handler)));
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 为错误查找最近的处理函数
    pub fn handler_for(&self, kind: &'static FaultKind) -> Option<&ThrowsHandler> {
        kind.ancestry().find_map(|ancestor| {
            self.handlers
                .iter()
                .find(|(k, _)| std::ptr::eq(*k, ancestor))
                .map(|(_, handler)| handler)
        })
    }
}

impl fmt::Debug for ThrowsAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrowsAdvice")
            .field("name", &self.name)
            .field(
                "handlers",
                &self.handlers.iter().map(|(k, _)| k.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// 通知
#[derive(Clone)]
pub enum Advice {
    Interceptor(Arc<dyn MethodInterceptor>),
    Before(Arc<dyn MethodBeforeAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    After(Arc<dyn AfterAdvice>),
    Throws(Arc<ThrowsAdvice>),
    Introduction(Arc<dyn IntroductionInterceptor>),
    Custom(Arc<dyn CustomAdvice>),
}

impl Advice {
    pub fn interceptor(interceptor: impl MethodInterceptor + 'static) -> Self {
        Advice::Interceptor(Arc::new(interceptor))
    }

    /// 以闭包作为环绕通知
    pub fn around<F>(f: F) -> Self
    where
        F: Fn(&mut MethodInvocation) -> AopResult<Option<Value>> + Send + Sync + 'static,
    {
        Advice::Interceptor(Arc::new(FnInterceptor(f)))
    }

    pub fn before<F>(f: F) -> Self
    where
        F: Fn(&'static Method, &Arguments) -> AopResult<()> + Send + Sync + 'static,
    {
        Advice::Before(Arc::new(FnBefore(f)))
    }

    pub fn after_returning<F>(f: F) -> Self
    where
        F: Fn(Option<&(dyn Any + Send)>, &'static Method, &Arguments) -> AopResult<()>
            + Send
            + Sync
            + 'static,
    {
        Advice::AfterReturning(Arc::new(FnAfterReturning(f)))
    }

    pub fn after<F>(f: F) -> Self
    where
        F: Fn(&'static Method, &Arguments) -> AopResult<()> + Send + Sync + 'static,
    {
        Advice::After(Arc::new(FnAfter(f)))
    }

    pub fn throws(advice: ThrowsAdvice) -> Self {
        Advice::Throws(Arc::new(advice))
    }

    pub fn introduction(interceptor: impl IntroductionInterceptor + 'static) -> Self {
        Advice::Introduction(Arc::new(interceptor))
    }

    pub fn custom(advice: impl CustomAdvice + 'static) -> Self {
        Advice::Custom(Arc::new(advice))
    }

    pub fn advice_type(&self) -> AdviceType {
        match self {
            Advice::Interceptor(_) => AdviceType::Around,
            Advice::Before(_) => AdviceType::Before,
            Advice::AfterReturning(_) => AdviceType::AfterReturning,
            Advice::After(_) => AdviceType::After,
            Advice::Throws(_) => AdviceType::AfterThrowing,
            Advice::Introduction(_) => AdviceType::Introduction,
            Advice::Custom(_) => AdviceType::Custom,
        }
    }

    /// 同一个通知实例
    pub fn same_as(&self, other: &Advice) -> bool {
        self.advice_type() == other.advice_type() && self.address() == other.address()
    }

    fn address(&self) -> usize {
        match self {
            Advice::Interceptor(a) => data_address(a),
            Advice::Before(a) => data_address(a),
            Advice::AfterReturning(a) => data_address(a),
            Advice::After(a) => data_address(a),
            Advice::Throws(a) => data_address(a),
            Advice::Introduction(a) => data_address(a),
            Advice::Custom(a) => data_address(a),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Advice::Interceptor(a) => a.describe(),
            Advice::Before(a) => a.describe(),
            Advice::AfterReturning(a) => a.describe(),
            Advice::After(a) => a.describe(),
            Advice::Throws(a) => format!("ThrowsAdvice({})", a.name()),
            Advice::Introduction(a) => a.describe(),
            Advice::Custom(a) => a.describe(),
        }
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.advice_type(), self.describe())
    }
}

// ========== 闭包形态的通知 ==========

struct FnInterceptor<F>(F);

impl<F> MethodInterceptor for FnInterceptor<F>
where
    F: Fn(&mut MethodInvocation) -> AopResult<Option<Value>> + Send + Sync,
{
    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
        (self.0)(invocation)
    }

    fn describe(&self) -> String {
        "around".to_string()
    }
}

struct FnBefore<F>(F);

impl<F> MethodBeforeAdvice for FnBefore<F>
where
    F: Fn(&'static Method, &Arguments) -> AopResult<()> + Send + Sync,
{
    fn before(
        &self,
        method: &'static Method,
        args: &Arguments,
        _target: Option<&Arc<dyn Dispatch>>,
    ) -> AopResult<()> {
        (self.0)(method, args)
    }

    fn describe(&self) -> String {
        "before".to_string()
    }
}

struct FnAfterReturning<F>(F);

impl<F> AfterReturningAdvice for FnAfterReturning<F>
where
    F: Fn(Option<&(dyn Any + Send)>, &'static Method, &Arguments) -> AopResult<()> + Send + Sync,
{
    fn after_returning(
        &self,
        value: Option<&(dyn Any + Send)>,
        method: &'static Method,
        args: &Arguments,
        _target: Option<&Arc<dyn Dispatch>>,
    ) -> AopResult<()> {
        (self.0)(value, method, args)
    }

    fn describe(&self) -> String {
        "after-returning".to_string()
    }
}

struct FnAfter<F>(F);

impl<F> AfterAdvice for FnAfter<F>
where
    F: Fn(&'static Method, &Arguments) -> AopResult<()> + Send + Sync,
{
    fn after(
        &self,
        method: &'static Method,
        args: &Arguments,
        _target: Option<&Arc<dyn Dispatch>>,
    ) -> AopResult<()> {
        (self.0)(method, args)
    }

    fn describe(&self) -> String {
        "after".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::kinds;

    #[test]
    fn test_throws_handler_lookup_walks_ancestry() {
        let advice = ThrowsAdvice::new("handlers")
            .on(&kinds::RUNTIME, |_, _, _| {})
            .on(&kinds::EXCEPTION, |_, _, _| {});

        let runtime = advice.handler_for(&kinds::ARITHMETIC).unwrap();
        let exact = advice.handler_for(&kinds::RUNTIME).unwrap();
        assert!(Arc::ptr_eq(runtime, exact));

        let io = advice.handler_for(&kinds::IO).unwrap();
        assert!(!Arc::ptr_eq(io, exact));

        assert!(advice.handler_for(&kinds::ERROR).is_none());
    }

    #[test]
    fn test_throws_handler_reregistration_replaces() {
        let advice = ThrowsAdvice::new("dup")
            .on(&kinds::IO, |_, _, _| {})
            .on(&kinds::IO, |_, _, _| {});
        assert_eq!(advice.handler_count(), 1);
    }

    #[test]
    fn test_advice_identity() {
        let a = Advice::before(|_, _| Ok(()));
        let b = a.clone();
        let c = Advice::before(|_, _| Ok(()));

        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert_eq!(a.advice_type(), AdviceType::Before);
        assert_eq!(a.describe(), "before");
    }
}
