//! Chimera AOP - 基于代理的方法拦截
//!
//! 在目标对象外包一层代理，调用代理方法时按顺序执行匹配的通知，最后调用目标。支持：
//! - 多种通知形态（环绕、前置、返回后、最终、异常、引入），统一适配为拦截器
//! - 切点库：名称通配、正则、`execution(..)` 表达式、组合切点、动态匹配
//! - 接口代理与子类代理两种生成策略
//! - 可替换的目标源（单例、热替换、原型、池化、线程本地）
//! - 通过 [`ProxyContext`] 访问当前代理，让目标的自调用也经过通知
//!
//! ```ignore
//! use chimera_aop::prelude::*;
//!
//! #[proxied]
//! pub trait Calculator {
//!     fn add(&self, a: i32, b: i32) -> AopResult<i32>;
//! }
//!
//! struct CalculatorImpl;
//!
//! impl Calculator for CalculatorImpl {
//!     fn add(&self, a: i32, b: i32) -> AopResult<i32> {
//!         Ok(a + b)
//!     }
//! }
//!
//! impl_target!(CalculatorImpl: dyn Calculator);
//!
//! let calculator = ProxyFactory::from_target(Arc::new(CalculatorImpl))
//!     .with_advice(Advice::interceptor(TraceInterceptor::new()))?
//!     .get_proxy_as::<dyn Calculator>()?;
//! assert_eq!(calculator.add(1, 2)?, 3);
//! ```

extern crate self as chimera_aop;

pub mod adapter;
pub mod advice;
pub mod advised;
pub mod advisor;
pub mod arguments;
pub mod chain;
pub mod dispatch;
pub mod error;
pub mod factory;
pub mod fault;
pub mod interceptors;
pub mod introduction;
pub mod joinpoint;
pub mod metadata;
pub mod pointcut;
pub mod proxy;
pub mod proxy_context;
pub mod registry;
pub mod target_source;

// 重新导出核心类型
pub use adapter::{
    AdvisorAdapter, AfterAdviceAdapter, AfterAdviceInterceptor, AfterReturningAdviceAdapter,
    AfterReturningAdviceInterceptor, BeforeAdviceAdapter, IntroductionInterceptorAdapter,
    MethodBeforeAdviceInterceptor, ThrowsAdviceAdapter, ThrowsAdviceInterceptor,
};
pub use advice::{
    Advice, AdviceType, AfterAdvice, AfterReturningAdvice, CustomAdvice, IntroductionInterceptor,
    MethodBeforeAdvice, MethodInterceptor, ThrowsAdvice, ThrowsHandler,
};
pub use advised::{AdvisedSupport, AdvisedSupportListener, ProxyConfig};
pub use advisor::{Advisor, AdvisorKind, DefaultIntroductionAdvisor, DefaultPointcutAdvisor, GlobalAdvisor};
pub use arguments::{data_address, nullable_of, object_of, value_of, Arguments, ObjectRef, Value, VarArgs};
pub use chain::{AdvisorChainFactory, Chain, ChainEntry, DefaultAdvisorChainFactory};
pub use dispatch::{ensure_exposes, invoke_method, Dispatch, ProxyInterface, TargetType};
pub use error::{AopError, AopResult};
pub use factory::ProxyFactory;
pub use fault::{kinds, Fault, FaultKind};
pub use interceptors::{
    DebugInterceptor, ExceptionLoggingInterceptor, PerformanceMonitorInterceptor, TraceInterceptor,
};
pub use introduction::DelegatingIntroductionInterceptor;
pub use joinpoint::MethodInvocation;
pub use metadata::{markers, Constructor, Interface, Method, MethodKey, ReturnType, TargetClass};
pub use pointcut::{
    ClassFilter, ComposablePointcut, DynamicMethodMatcher, Expression, ExpressionPointcut,
    InterfaceClassFilter, MethodMatcher, NameMatchMethodPointcut, Pointcut, RegexMethodPointcut,
    TrueClassFilter, TrueMethodMatcher, TruePointcut, TypeNameClassFilter,
};
pub use proxy::{
    AopProxy, AopProxyFactory, ClassProxy, DefaultAopProxyFactory, InterfaceProxy, ProxyStrategy,
};
pub use proxy_context::ProxyContext;
pub use registry::{global_adapter_registry, AdapterRegistration, AdviceAdapterRegistry, AdviceOrAdvisor};
pub use target_source::{
    EmptyTargetSource, HotSwappableTargetSource, PooledTargetSource, PrototypeTargetSource,
    SingletonTargetSource, TargetSource, ThreadLocalTargetSource,
};

// 导出 inventory 供适配器注册使用
pub use inventory;

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}

/// 预导入模块
pub mod prelude {
    pub use crate::advice::*;
    pub use crate::advised::{AdvisedSupport, ProxyConfig};
    pub use crate::advisor::{Advisor, DefaultIntroductionAdvisor, DefaultPointcutAdvisor};
    pub use crate::arguments::{Arguments, ObjectRef, Value, VarArgs};
    pub use crate::dispatch::{Dispatch, ProxyInterface, TargetType};
    pub use crate::error::{AopError, AopResult};
    pub use crate::factory::ProxyFactory;
    pub use crate::fault::{kinds, Fault, FaultKind};
    pub use crate::impl_target;
    pub use crate::interceptors::*;
    pub use crate::joinpoint::MethodInvocation;
    pub use crate::metadata::{Constructor, Method, TargetClass};
    pub use crate::pointcut::{
        ComposablePointcut, ExpressionPointcut, NameMatchMethodPointcut, Pointcut, RegexMethodPointcut,
    };
    pub use crate::proxy::{AopProxy, ProxyStrategy};
    pub use crate::proxy_context::ProxyContext;
    pub use crate::target_source::*;
    pub use std::sync::Arc;
}
