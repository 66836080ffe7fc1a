//! 通知适配器注册表
//!
//! 把任意形态的通知统一为通知器和拦截器。

use crate::adapter::{
    AdvisorAdapter, AfterAdviceAdapter, AfterReturningAdviceAdapter, BeforeAdviceAdapter,
    IntroductionInterceptorAdapter, ThrowsAdviceAdapter,
};
use crate::advice::{Advice, MethodInterceptor};
use crate::advisor::{Advisor, DefaultPointcutAdvisor};
use crate::error::{AopError, AopResult};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

/// 全局适配器注册表
///
/// 首次使用时创建，加载内置适配器以及所有通过 inventory 提交的适配器
static GLOBAL_ADAPTER_REGISTRY: Lazy<Arc<AdviceAdapterRegistry>> = Lazy::new(|| {
    let registry = AdviceAdapterRegistry::new();
    registry.auto_load_adapters();
    Arc::new(registry)
});

/// 获取全局适配器注册表
pub fn global_adapter_registry() -> &'static Arc<AdviceAdapterRegistry> {
    &GLOBAL_ADAPTER_REGISTRY
}

/// 适配器注册器
///
/// 用于 inventory 自动收集自定义适配器：
///
/// ```ignore
/// fn retry_adapter() -> Arc<dyn AdvisorAdapter> {
///     Arc::new(RetryAdviceAdapter)
/// }
///
/// chimera_aop::inventory::submit! {
///     AdapterRegistration::new("retry", retry_adapter)
/// }
/// ```
pub struct AdapterRegistration {
    pub name: &'static str,
    pub creator: fn() -> Arc<dyn AdvisorAdapter>,
}

impl AdapterRegistration {
    pub const fn new(name: &'static str, creator: fn() -> Arc<dyn AdvisorAdapter>) -> Self {
        Self { name, creator }
    }

    pub fn create_instance(&self) -> Arc<dyn AdvisorAdapter> {
        (self.creator)()
    }
}

inventory::collect!(AdapterRegistration);

/// 通知或通知器
pub enum AdviceOrAdvisor {
    Advice(Advice),
    Advisor(Arc<dyn Advisor>),
}

impl From<Advice> for AdviceOrAdvisor {
    fn from(advice: Advice) -> Self {
        AdviceOrAdvisor::Advice(advice)
    }
}

impl From<Arc<dyn Advisor>> for AdviceOrAdvisor {
    fn from(advisor: Arc<dyn Advisor>) -> Self {
        AdviceOrAdvisor::Advisor(advisor)
    }
}

/// 适配器注册表
pub struct AdviceAdapterRegistry {
    adapters: RwLock<Vec<Arc<dyn AdvisorAdapter>>>,
}

impl AdviceAdapterRegistry {
    /// 包含内置适配器（前置、返回后、后置、异常）
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register_adapter(Arc::new(BeforeAdviceAdapter));
        registry.register_adapter(Arc::new(AfterReturningAdviceAdapter));
        registry.register_adapter(Arc::new(AfterAdviceAdapter));
        registry.register_adapter(Arc::new(ThrowsAdviceAdapter));
        registry
    }

    pub fn empty() -> Self {
        Self {
            adapters: RwLock::new(Vec::new()),
        }
    }

    pub fn register_adapter(&self, adapter: Arc<dyn AdvisorAdapter>) {
        tracing::debug!("Registering advisor adapter: {}", adapter.name());
        self.adapters.write().push(adapter);
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.read().len()
    }

    pub fn supports(&self, advice: &Advice) -> bool {
        match advice {
            Advice::Interceptor(_) => true,
            other => self.adapters.read().iter().any(|a| a.supports(other)),
        }
    }

    /// 把通知包装为通知器
    ///
    /// 通知器原样返回；拦截器以及可被适配器识别的通知包装为匹配所有方法的
    /// [`DefaultPointcutAdvisor`]；其他通知返回 [`AopError::UnknownAdviceType`]。
    pub fn wrap(&self, item: impl Into<AdviceOrAdvisor>) -> AopResult<Arc<dyn Advisor>> {
        match item.into() {
            AdviceOrAdvisor::Advisor(advisor) => Ok(advisor),
            AdviceOrAdvisor::Advice(Advice::Introduction(interceptor)) => Err(AopError::Config(format!(
                "Introduction advice [{}] requires an introduction advisor",
                interceptor.describe()
            ))),
            AdviceOrAdvisor::Advice(advice) => {
                if self.supports(&advice) {
                    Ok(Arc::new(DefaultPointcutAdvisor::new(advice)))
                } else {
                    Err(AopError::UnknownAdviceType(advice.describe()))
                }
            }
        }
    }

    /// 通知器对应的拦截器
    ///
    /// 同一通知器可能被多个适配器识别，结果按适配器注册顺序排列。
    pub fn interceptors(&self, advisor: &dyn Advisor) -> AopResult<Vec<Arc<dyn MethodInterceptor>>> {
        let mut interceptors: Vec<Arc<dyn MethodInterceptor>> = Vec::with_capacity(1);
        let advice = advisor.advice();

        match advice {
            Advice::Interceptor(interceptor) => interceptors.push(interceptor.clone()),
            Advice::Introduction(interceptor) => {
                interceptors.push(Arc::new(IntroductionInterceptorAdapter::new(interceptor.clone())))
            }
            _ => {}
        }

        for adapter in self.adapters.read().iter() {
            if adapter.supports(advice) {
                interceptors.push(adapter.interceptor(advisor)?);
            }
        }

        if interceptors.is_empty() {
            return Err(AopError::UnknownAdviceType(advice.describe()));
        }
        Ok(interceptors)
    }

    /// 从 inventory 加载所有提交的适配器
    pub fn auto_load_adapters(&self) {
        let registrations: Vec<_> = inventory::iter::<AdapterRegistration>.into_iter().collect();
        if registrations.is_empty() {
            return;
        }
        tracing::info!("Auto-loading {} advisor adapter(s)", registrations.len());

        for registration in registrations {
            tracing::debug!("  ├─ Loading adapter: {}", registration.name);
            self.register_adapter(registration.create_instance());
        }
    }
}

impl Default for AdviceAdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
