//! 代理工厂
//!
//! ```ignore
//! let calculator: Arc<dyn Calculator> = ProxyFactory::from_target(Arc::new(CalculatorImpl))
//!     .with_advice(Advice::before(|method, _| {
//!         tracing::info!("calling {}", method);
//!         Ok(())
//!     }))?
//!     .get_proxy_as::<dyn Calculator>()?;
//! ```

use crate::advice::{Advice, MethodInterceptor};
use crate::advised::{AdvisedSupport, AdvisedSupportListener, ProxyConfig};
use crate::advisor::Advisor;
use crate::arguments::Arguments;
use crate::chain::AdvisorChainFactory;
use crate::dispatch::{Dispatch, ProxyInterface};
use crate::error::AopResult;
use crate::metadata::Interface;
use crate::proxy::{AopProxy, AopProxyFactory, DefaultAopProxyFactory};
use crate::target_source::{EmptyTargetSource, TargetSource};
use std::sync::Arc;

/// 构建代理的入口
pub struct ProxyFactory {
    advised: Arc<AdvisedSupport>,
    aop_proxy_factory: Arc<dyn AopProxyFactory>,
    constructor_args: Option<Arguments>,
}

impl ProxyFactory {
    pub fn new() -> Self {
        Self {
            advised: Arc::new(AdvisedSupport::new()),
            aop_proxy_factory: Arc::new(DefaultAopProxyFactory),
            constructor_args: None,
        }
    }

    /// 以目标创建工厂，并代理目标实现的全部用户接口
    pub fn from_target(target: Arc<dyn Dispatch>) -> Self {
        let factory = Self::new();
        for interface in target.target_class().user_interfaces() {
            // 类方法面在描述符中单独存放，这里只会是接口
            if let Err(e) = factory.advised.add_interface(interface) {
                debug_assert!(false, "user interface rejected: {e}");
                tracing::warn!("Skipping interface [{}] of target: {}", interface, e);
            }
        }
        factory.with_target(target)
    }

    /// 设置单例目标，不改变代理接口
    pub fn with_target(self, target: Arc<dyn Dispatch>) -> Self {
        self.advised.set_target(target);
        self
    }

    pub fn with_target_source(self, target_source: Arc<dyn TargetSource>) -> Self {
        self.advised.set_target_source(target_source);
        self
    }

    pub fn with_interface(self, interface: &'static Interface) -> AopResult<Self> {
        self.advised.add_interface(interface)?;
        Ok(self)
    }

    /// 代理 `I` 对应的接口
    pub fn with_interface_of<I: ?Sized + ProxyInterface>(self) -> AopResult<Self> {
        self.with_interface(I::interface())
    }

    pub fn with_advice(self, advice: Advice) -> AopResult<Self> {
        self.advised.add_advice(advice)?;
        Ok(self)
    }

    pub fn with_advisor(self, advisor: Arc<dyn Advisor>) -> AopResult<Self> {
        self.advised.add_advisor(advisor)?;
        Ok(self)
    }

    pub fn proxy_target_class(self, value: bool) -> Self {
        self.advised.set_proxy_target_class(value);
        self
    }

    pub fn optimize(self, value: bool) -> Self {
        self.advised.set_optimize(value);
        self
    }

    pub fn opaque(self, value: bool) -> Self {
        self.advised.set_opaque(value);
        self
    }

    pub fn expose_proxy(self, value: bool) -> Self {
        self.advised.set_expose_proxy(value);
        self
    }

    pub fn frozen(self, value: bool) -> Self {
        self.advised.set_frozen(value);
        self
    }

    pub fn pre_filtered(self, value: bool) -> Self {
        self.advised.set_pre_filtered(value);
        self
    }

    /// 一次性应用全部开关
    pub fn with_config(self, config: &ProxyConfig) -> Self {
        self.advised.apply_config(config);
        self
    }

    /// 子类代理的构造参数
    pub fn constructor_args(mut self, args: Arguments) -> Self {
        self.constructor_args = Some(args);
        self
    }

    pub fn with_chain_factory(self, factory: Arc<dyn AdvisorChainFactory>) -> Self {
        self.advised.set_chain_factory(factory);
        self
    }

    pub fn with_aop_proxy_factory(mut self, factory: Arc<dyn AopProxyFactory>) -> Self {
        self.aop_proxy_factory = factory;
        self
    }

    pub fn with_listener(self, listener: Arc<dyn AdvisedSupportListener>) -> Self {
        self.advised.add_listener(listener);
        self
    }

    /// 底层配置，可在生成代理后继续修改（冻结前）
    pub fn advised(&self) -> &Arc<AdvisedSupport> {
        &self.advised
    }

    /// 生成代理；第一次调用时激活配置
    pub fn get_proxy(&self) -> AopResult<Arc<dyn AopProxy>> {
        self.advised.activate();
        let proxy = self
            .aop_proxy_factory
            .create_aop_proxy(Arc::clone(&self.advised), self.constructor_args.clone())?;
        tracing::debug!(
            "Created {} proxy for [{}]",
            proxy.strategy(),
            self.advised
                .target_class()
                .map_or_else(|| "<no target>".to_string(), |c| c.name().to_string())
        );
        Ok(proxy)
    }

    /// 生成代理并视为接口 `I`
    pub fn get_proxy_as<I: ?Sized + ProxyInterface>(&self) -> AopResult<Arc<I>> {
        I::from_proxy(self.get_proxy()?)
    }

    /// 没有目标的接口代理，所有方法都由拦截器实现
    pub fn proxy_for<I: ?Sized + ProxyInterface>(
        interceptor: impl MethodInterceptor + 'static,
    ) -> AopResult<Arc<I>> {
        ProxyFactory::new()
            .with_target_source(Arc::new(EmptyTargetSource::new()))
            .with_interface_of::<I>()?
            .with_advice(Advice::interceptor(interceptor))?
            .get_proxy_as::<I>()
    }

    /// 以目标源代理接口 `I`
    pub fn proxy_for_target_source<I: ?Sized + ProxyInterface>(
        target_source: Arc<dyn TargetSource>,
    ) -> AopResult<Arc<I>> {
        ProxyFactory::new()
            .with_target_source(target_source)
            .with_interface_of::<I>()?
            .get_proxy_as::<I>()
    }
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::new()
    }
}
