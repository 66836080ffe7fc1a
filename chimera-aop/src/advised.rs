//! 代理配置（AdvisedSupport）
//!
//! 持有目标源、通知器列表、代理接口和各项开关，并缓存每个方法的拦截链。
//!
//! 通知器列表、接口列表和拦截链缓存打包在一个不可变快照中，修改时整体替换。
//! 调用开始时取一次快照，因此并发调用不会看到“新通知器 + 旧缓存”的组合。

use crate::advice::Advice;
use crate::advisor::{Advisor, AdvisorKind};
use crate::arguments::data_address;
use crate::chain::{AdvisorChainFactory, Chain, DefaultAdvisorChainFactory};
use crate::dispatch::Dispatch;
use crate::error::{AopError, AopResult};
use crate::metadata::{Interface, Method, MethodKey, TargetClass};
use crate::registry::global_adapter_registry;
use crate::target_source::{EmptyTargetSource, SingletonTargetSource, TargetSource};
use chimera_core::Environment;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 代理开关
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// 即使目标实现了接口也使用子类代理
    pub proxy_target_class: bool,
    /// 允许激进优化（选择子类代理）
    pub optimize: bool,
    /// 代理不暴露 `Advised` 接口
    pub opaque: bool,
    /// 调用期间通过 `ProxyContext` 暴露当前代理
    pub expose_proxy: bool,
    /// 冻结通知链
    pub frozen: bool,
}

impl ProxyConfig {
    /// 配置前缀
    pub const PREFIX: &'static str = "aop.proxy";

    /// 从 `aop.proxy.*` 读取开关，缺省项为 `false`
    pub fn from_environment(env: &Environment) -> AopResult<Self> {
        env.bind(Self::PREFIX)
            .map_err(|e| AopError::Config(format!("Invalid proxy configuration: {}", e)))
    }
}

/// 配置变化监听器
pub trait AdvisedSupportListener: Send + Sync {
    /// 第一个代理创建时调用一次
    fn activated(&self, advised: &AdvisedSupport);

    /// 激活后每次修改通知器或接口时调用
    fn advice_changed(&self, advised: &AdvisedSupport);
}

enum ChainCache {
    /// 没有通知器依赖具体方法，所有方法共用一条链
    Shared(OnceCell<Chain>),
    PerMethod(DashMap<MethodKey, Chain>),
}

impl ChainCache {
    fn for_advisors(advisors: &[Arc<dyn Advisor>]) -> Self {
        if advisors.iter().any(|a| a.is_method_specific()) {
            ChainCache::PerMethod(DashMap::new())
        } else {
            ChainCache::Shared(OnceCell::new())
        }
    }
}

/// 配置快照
pub(crate) struct Snapshot {
    pub(crate) target_source: Arc<dyn TargetSource>,
    pub(crate) advisors: Vec<Arc<dyn Advisor>>,
    pub(crate) interfaces: Vec<&'static Interface>,
    cache: ChainCache,
}

impl Snapshot {
    fn new(
        target_source: Arc<dyn TargetSource>,
        advisors: Vec<Arc<dyn Advisor>>,
        interfaces: Vec<&'static Interface>,
    ) -> Self {
        let cache = ChainCache::for_advisors(&advisors);
        Self {
            target_source,
            advisors,
            interfaces,
            cache,
        }
    }

    /// 重建快照时缓存随之丢弃
    fn with_interfaces(&self, interfaces: Vec<&'static Interface>) -> Self {
        Self::new(Arc::clone(&self.target_source), self.advisors.clone(), interfaces)
    }

    fn with_target_source(&self, target_source: Arc<dyn TargetSource>) -> Self {
        Self::new(target_source, self.advisors.clone(), self.interfaces.clone())
    }

    pub(crate) fn chain(
        &self,
        factory: &dyn AdvisorChainFactory,
        pre_filtered: bool,
        method: &'static Method,
        target_class: Option<&TargetClass>,
    ) -> AopResult<Chain> {
        let compute = || {
            tracing::debug!("Interceptor chain cache miss for {}", method);
            factory.interceptor_chain(&self.advisors, pre_filtered, method, target_class)
        };

        match &self.cache {
            ChainCache::Shared(cell) => cell.get_or_try_init(compute).map(Arc::clone),
            ChainCache::PerMethod(map) => {
                let key = method.key();
                if let Some(chain) = map.get(&key) {
                    return Ok(Arc::clone(chain.value()));
                }
                // 两个线程同时未命中时各自计算，后写入者覆盖
                let chain = compute()?;
                map.insert(key, Arc::clone(&chain));
                Ok(chain)
            }
        }
    }

    fn introduced_interfaces(advisor: &dyn Advisor) -> Vec<&'static Interface> {
        match advisor.kind() {
            AdvisorKind::Introduction { interfaces, .. } => interfaces.to_vec(),
            _ => Vec::new(),
        }
    }
}

/// 代理配置
pub struct AdvisedSupport {
    state: RwLock<Arc<Snapshot>>,
    chain_factory: RwLock<Arc<dyn AdvisorChainFactory>>,
    proxy_target_class: AtomicBool,
    optimize: AtomicBool,
    opaque: AtomicBool,
    expose_proxy: AtomicBool,
    frozen: AtomicBool,
    pre_filtered: AtomicBool,
    active: AtomicBool,
    listeners: Mutex<Vec<Arc<dyn AdvisedSupportListener>>>,
}

impl AdvisedSupport {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Arc::new(Snapshot::new(
                Arc::new(EmptyTargetSource::new()),
                Vec::new(),
                Vec::new(),
            ))),
            chain_factory: RwLock::new(Arc::new(DefaultAdvisorChainFactory::new())),
            proxy_target_class: AtomicBool::new(false),
            optimize: AtomicBool::new(false),
            opaque: AtomicBool::new(false),
            expose_proxy: AtomicBool::new(false),
            frozen: AtomicBool::new(false),
            pre_filtered: AtomicBool::new(false),
            active: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.state.read())
    }

    // ========== 目标源 ==========

    pub fn set_target_source(&self, target_source: Arc<dyn TargetSource>) {
        let mut state = self.state.write();
        *state = Arc::new(state.with_target_source(target_source));
    }

    /// 以单例目标源包装目标
    pub fn set_target(&self, target: Arc<dyn Dispatch>) {
        self.set_target_source(Arc::new(SingletonTargetSource::new(target)));
    }

    pub fn target_source(&self) -> Arc<dyn TargetSource> {
        Arc::clone(&self.state.read().target_source)
    }

    pub fn target_class(&self) -> Option<Arc<TargetClass>> {
        self.state.read().target_source.target_class()
    }

    // ========== 开关 ==========

    pub fn is_proxy_target_class(&self) -> bool {
        self.proxy_target_class.load(Ordering::Acquire)
    }

    pub fn set_proxy_target_class(&self, value: bool) {
        self.proxy_target_class.store(value, Ordering::Release);
    }

    pub fn is_optimize(&self) -> bool {
        self.optimize.load(Ordering::Acquire)
    }

    pub fn set_optimize(&self, value: bool) {
        self.optimize.store(value, Ordering::Release);
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque.load(Ordering::Acquire)
    }

    pub fn set_opaque(&self, value: bool) {
        self.opaque.store(value, Ordering::Release);
    }

    pub fn is_expose_proxy(&self) -> bool {
        self.expose_proxy.load(Ordering::Acquire)
    }

    pub fn set_expose_proxy(&self, value: bool) {
        self.expose_proxy.store(value, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub fn set_frozen(&self, value: bool) {
        self.frozen.store(value, Ordering::Release);
    }

    /// 通知器已针对目标类预先筛选，解析拦截链时跳过类过滤器
    pub fn is_pre_filtered(&self) -> bool {
        self.pre_filtered.load(Ordering::Acquire)
    }

    pub fn set_pre_filtered(&self, value: bool) {
        self.pre_filtered.store(value, Ordering::Release);
        self.invalidate();
    }

    pub fn config(&self) -> ProxyConfig {
        ProxyConfig {
            proxy_target_class: self.is_proxy_target_class(),
            optimize: self.is_optimize(),
            opaque: self.is_opaque(),
            expose_proxy: self.is_expose_proxy(),
            frozen: self.is_frozen(),
        }
    }

    pub fn apply_config(&self, config: &ProxyConfig) {
        self.set_proxy_target_class(config.proxy_target_class);
        self.set_optimize(config.optimize);
        self.set_opaque(config.opaque);
        self.set_expose_proxy(config.expose_proxy);
        self.set_frozen(config.frozen);
    }

    pub fn set_chain_factory(&self, factory: Arc<dyn AdvisorChainFactory>) {
        *self.chain_factory.write() = factory;
        self.invalidate();
    }

    // ========== 接口 ==========

    /// 增加代理接口；类方法面不能作为接口代理
    pub fn add_interface(&self, interface: &'static Interface) -> AopResult<()> {
        if interface.is_class_surface() {
            return Err(AopError::Config(format!("[{}] is not an interface", interface)));
        }
        {
            let mut state = self.state.write();
            if state.interfaces.iter().any(|i| *i == interface) {
                return Ok(());
            }
            let mut interfaces = state.interfaces.clone();
            interfaces.push(interface);
            *state = Arc::new(state.with_interfaces(interfaces));
        }
        tracing::debug!("Added proxied interface [{}]", interface);
        self.advice_changed();
        Ok(())
    }

    pub fn remove_interface(&self, interface: &Interface) -> bool {
        {
            let mut state = self.state.write();
            if !state.interfaces.iter().any(|i| *i == interface) {
                return false;
            }
            let interfaces = state
                .interfaces
                .iter()
                .copied()
                .filter(|i| *i != interface)
                .collect();
            *state = Arc::new(state.with_interfaces(interfaces));
        }
        self.advice_changed();
        true
    }

    pub fn interfaces(&self) -> Vec<&'static Interface> {
        self.state.read().interfaces.clone()
    }

    pub fn is_interface_proxied(&self, interface: &Interface) -> bool {
        self.state.read().interfaces.iter().any(|i| *i == interface)
    }

    // ========== 通知器 ==========

    pub fn advisors(&self) -> Vec<Arc<dyn Advisor>> {
        self.state.read().advisors.clone()
    }

    pub fn advisor_count(&self) -> usize {
        self.state.read().advisors.len()
    }

    pub fn add_advisor(&self, advisor: Arc<dyn Advisor>) -> AopResult<()> {
        let position = self.advisor_count();
        self.add_advisor_at(position, advisor)
    }

    /// 在指定位置插入通知器；引入通知器经过校验后登记其接口
    pub fn add_advisor_at(&self, position: usize, advisor: Arc<dyn Advisor>) -> AopResult<()> {
        let introduced = advisor.validate_introduction()?;
        {
            let mut state = self.state.write();
            self.check_not_frozen("add advisor")?;
            if position > state.advisors.len() {
                return Err(AopError::AdvisorIndexOutOfRange {
                    index: position,
                    count: state.advisors.len(),
                });
            }

            let mut advisors = state.advisors.clone();
            advisors.insert(position, Arc::clone(&advisor));
            let mut interfaces = state.interfaces.clone();
            for interface in introduced {
                if !interfaces.iter().any(|i| *i == interface) {
                    interfaces.push(interface);
                }
            }
            *state = Arc::new(Snapshot::new(
                Arc::clone(&state.target_source),
                advisors,
                interfaces,
            ));
        }
        tracing::debug!("Added advisor at position {}: {}", position, advisor.describe());
        self.advice_changed();
        Ok(())
    }

    /// 移除并返回指定位置的通知器，同时撤销它引入的接口
    pub fn remove_advisor(&self, index: usize) -> AopResult<Arc<dyn Advisor>> {
        let removed = {
            let mut state = self.state.write();
            self.check_not_frozen("remove advisor")?;
            if index >= state.advisors.len() {
                return Err(AopError::AdvisorIndexOutOfRange {
                    index,
                    count: state.advisors.len(),
                });
            }

            let mut advisors = state.advisors.clone();
            let removed = advisors.remove(index);
            let withdrawn = Snapshot::introduced_interfaces(removed.as_ref());
            let interfaces = state
                .interfaces
                .iter()
                .copied()
                .filter(|i| !withdrawn.contains(i))
                .collect();
            *state = Arc::new(Snapshot::new(
                Arc::clone(&state.target_source),
                advisors,
                interfaces,
            ));
            removed
        };
        tracing::debug!("Removed advisor at position {}: {}", index, removed.describe());
        self.advice_changed();
        Ok(removed)
    }

    /// 按引用移除通知器，找不到时返回 `false`
    pub fn remove_advisor_ref(&self, advisor: &Arc<dyn Advisor>) -> AopResult<bool> {
        self.check_not_frozen("remove advisor")?;
        match self.index_of_advisor(advisor) {
            Some(index) => self.remove_advisor(index).map(|_| true),
            None => Ok(false),
        }
    }

    /// 用 `b` 替换 `a`，`a` 不在列表中时返回 `false`
    pub fn replace_advisor(&self, a: &Arc<dyn Advisor>, b: Arc<dyn Advisor>) -> AopResult<bool> {
        let introduced = b.validate_introduction()?;
        {
            let mut state = self.state.write();
            self.check_not_frozen("replace advisor")?;
            let index = match state
                .advisors
                .iter()
                .position(|x| data_address(x) == data_address(a))
            {
                Some(index) => index,
                None => return Ok(false),
            };

            let mut advisors = state.advisors.clone();
            let withdrawn = Snapshot::introduced_interfaces(advisors[index].as_ref());
            advisors[index] = Arc::clone(&b);
            let mut interfaces: Vec<_> = state
                .interfaces
                .iter()
                .copied()
                .filter(|i| !withdrawn.contains(i))
                .collect();
            for interface in introduced {
                if !interfaces.iter().any(|i| *i == interface) {
                    interfaces.push(interface);
                }
            }
            *state = Arc::new(Snapshot::new(
                Arc::clone(&state.target_source),
                advisors,
                interfaces,
            ));
        }
        tracing::debug!("Replaced advisor {} with {}", a.describe(), b.describe());
        self.advice_changed();
        Ok(true)
    }

    pub fn index_of_advisor(&self, advisor: &Arc<dyn Advisor>) -> Option<usize> {
        self.state
            .read()
            .advisors
            .iter()
            .position(|x| data_address(x) == data_address(advisor))
    }

    /// 通知经全局适配器注册表包装为匹配所有方法的通知器
    pub fn add_advice(&self, advice: Advice) -> AopResult<()> {
        let position = self.advisor_count();
        self.add_advice_at(position, advice)
    }

    pub fn add_advice_at(&self, position: usize, advice: Advice) -> AopResult<()> {
        self.check_not_frozen("add advice")?;
        let advisor = global_adapter_registry().wrap(advice)?;
        self.add_advisor_at(position, advisor)
    }

    pub fn remove_advice(&self, advice: &Advice) -> AopResult<bool> {
        self.check_not_frozen("remove advice")?;
        match self.index_of_advice(advice) {
            Some(index) => self.remove_advisor(index).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn index_of_advice(&self, advice: &Advice) -> Option<usize> {
        self.state
            .read()
            .advisors
            .iter()
            .position(|a| a.advice().same_as(advice))
    }

    // ========== 拦截链 ==========

    /// 方法的拦截链
    ///
    /// 同一快照内对同一方法的重复调用返回同一个 `Arc`。
    pub fn get_interceptor_chain(
        &self,
        method: &'static Method,
        target_class: Option<&TargetClass>,
    ) -> AopResult<Chain> {
        let snapshot = self.snapshot();
        self.chain_for(&snapshot, method, target_class)
    }

    pub(crate) fn chain_for(
        &self,
        snapshot: &Snapshot,
        method: &'static Method,
        target_class: Option<&TargetClass>,
    ) -> AopResult<Chain> {
        let factory = Arc::clone(&self.chain_factory.read());
        snapshot.chain(factory.as_ref(), self.is_pre_filtered(), method, target_class)
    }

    // ========== 复制与监听 ==========

    /// 复制另一个配置的开关、目标源、通知器和接口
    pub fn copy_configuration_from(&self, other: &AdvisedSupport) -> AopResult<()> {
        let source = other.snapshot();
        self.check_not_frozen("copy configuration")?;
        self.apply_config(&other.config());
        self.pre_filtered.store(other.is_pre_filtered(), Ordering::Release);
        *self.chain_factory.write() = Arc::clone(&other.chain_factory.read());
        *self.state.write() = Arc::new(Snapshot::new(
            Arc::clone(&source.target_source),
            source.advisors.clone(),
            source.interfaces.clone(),
        ));
        self.advice_changed();
        Ok(())
    }

    pub fn add_listener(&self, listener: Arc<dyn AdvisedSupportListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn AdvisedSupportListener>) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| data_address(l) != data_address(listener));
        listeners.len() != before
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// 第一个代理创建时调用
    pub(crate) fn activate(&self) {
        if self.active.swap(true, Ordering::AcqRel) {
            return;
        }
        for listener in self.listeners_snapshot() {
            listener.activated(self);
        }
    }

    fn listeners_snapshot(&self) -> Vec<Arc<dyn AdvisedSupportListener>> {
        self.listeners.lock().clone()
    }

    fn advice_changed(&self) {
        if !self.is_active() {
            return;
        }
        for listener in self.listeners_snapshot() {
            listener.advice_changed(self);
        }
    }

    fn invalidate(&self) {
        let mut state = self.state.write();
        *state = Arc::new(state.with_interfaces(state.interfaces.clone()));
    }

    fn check_not_frozen(&self, operation: &'static str) -> AopResult<()> {
        if self.is_frozen() {
            Err(AopError::Frozen { operation })
        } else {
            Ok(())
        }
    }

    /// 配置摘要
    pub fn to_proxy_config_string(&self) -> String {
        let snapshot = self.snapshot();
        let interfaces: Vec<_> = snapshot.interfaces.iter().map(|i| i.name()).collect();
        let advisors: Vec<_> = snapshot.advisors.iter().map(|a| a.describe()).collect();
        format!(
            "AdvisedSupport: {} interface(s) {:?}; {} advisor(s) {:?}; targetSource [{}]; \
             proxyTargetClass={}; optimize={}; opaque={}; exposeProxy={}; frozen={}",
            interfaces.len(),
            interfaces,
            advisors.len(),
            advisors,
            snapshot.target_source.describe(),
            self.is_proxy_target_class(),
            self.is_optimize(),
            self.is_opaque(),
            self.is_expose_proxy(),
            self.is_frozen()
        )
    }
}

impl Default for AdvisedSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AdvisedSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_proxy_config_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{IntroductionInterceptor, MethodInterceptor};
    use crate::advisor::{DefaultIntroductionAdvisor, DefaultPointcutAdvisor};
    use crate::arguments::Value;
    use crate::joinpoint::MethodInvocation;
    use crate::metadata::ReturnType;
    use crate::pointcut::NameMatchMethodPointcut;
    use chimera_core::{ConfigValue, MapPropertySource};
    use std::any::TypeId;
    use std::sync::atomic::AtomicUsize;

    struct StoreTag;
    struct LockableTag;

    fn store_id() -> TypeId {
        TypeId::of::<StoreTag>()
    }

    fn lockable_id() -> TypeId {
        TypeId::of::<LockableTag>()
    }

    static STORE_METHODS: [Method; 2] = [
        Method::new("Store", "get", 0).with_params(1).returns(ReturnType::Nullable, "String"),
        Method::new("Store", "put", 1).with_params(2),
    ];
    static STORE: Interface = Interface::new("Store", &STORE_METHODS, store_id);

    static LOCKABLE_METHODS: [Method; 1] = [Method::new("Lockable", "lock", 0)];
    static LOCKABLE: Interface = Interface::new("Lockable", &LOCKABLE_METHODS, lockable_id);

    struct Pass;

    impl MethodInterceptor for Pass {
        fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
            invocation.proceed()
        }
    }

    struct Locker;

    impl IntroductionInterceptor for Locker {
        fn implements_interface(&self, interface: &Interface) -> bool {
            *interface == LOCKABLE
        }

        fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
            invocation.proceed()
        }
    }

    fn get() -> &'static Method {
        STORE.method("get").unwrap()
    }

    fn put() -> &'static Method {
        STORE.method("put").unwrap()
    }

    #[test]
    fn test_chain_is_cached_per_method() {
        let advised = AdvisedSupport::new();
        advised
            .add_advisor(Arc::new(DefaultPointcutAdvisor::with_pointcut(
                Arc::new(NameMatchMethodPointcut::new().with_name("get")),
                Advice::interceptor(Pass),
            )))
            .unwrap();

        let first = advised.get_interceptor_chain(get(), None).unwrap();
        let second = advised.get_interceptor_chain(get(), None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 1);
        assert!(advised.get_interceptor_chain(put(), None).unwrap().is_empty());
    }

    #[test]
    fn test_shared_chain_when_no_advisor_is_method_specific() {
        let advised = AdvisedSupport::new();
        advised.add_advice(Advice::interceptor(Pass)).unwrap();

        let a = advised.get_interceptor_chain(get(), None).unwrap();
        let b = advised.get_interceptor_chain(put(), None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_mutation_invalidates_cache() {
        let advised = AdvisedSupport::new();
        advised.add_advice(Advice::interceptor(Pass)).unwrap();
        let before = advised.get_interceptor_chain(get(), None).unwrap();

        advised.add_advice(Advice::before(|_, _| Ok(()))).unwrap();
        let after = advised.get_interceptor_chain(get(), None).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.len(), 2);
    }

    #[test]
    fn test_frozen_configuration_rejects_mutation() {
        let advised = AdvisedSupport::new();
        let advisor: Arc<dyn Advisor> = Arc::new(DefaultPointcutAdvisor::new(Advice::interceptor(Pass)));
        advised.add_advisor(advisor.clone()).unwrap();
        advised.set_frozen(true);

        let replacement: Arc<dyn Advisor> =
            Arc::new(DefaultPointcutAdvisor::new(Advice::interceptor(Pass)));
        assert!(matches!(
            advised.add_advisor(replacement.clone()),
            Err(AopError::Frozen { .. })
        ));
        assert!(matches!(advised.remove_advisor(0), Err(AopError::Frozen { .. })));
        assert!(matches!(
            advised.replace_advisor(&advisor, replacement),
            Err(AopError::Frozen { .. })
        ));
        assert!(matches!(
            advised.add_advice(Advice::interceptor(Pass)),
            Err(AopError::Frozen { .. })
        ));
        assert_eq!(advised.advisor_count(), 1);
        assert_eq!(advised.index_of_advisor(&advisor), Some(0));
    }

    #[test]
    fn test_index_errors() {
        let advised = AdvisedSupport::new();
        assert!(matches!(
            advised.remove_advisor(0),
            Err(AopError::AdvisorIndexOutOfRange { index: 0, count: 0 })
        ));
        assert!(matches!(
            advised.add_advice_at(3, Advice::interceptor(Pass)),
            Err(AopError::AdvisorIndexOutOfRange { index: 3, count: 0 })
        ));
    }

    #[test]
    fn test_advice_lookup_and_removal() {
        let advised = AdvisedSupport::new();
        let first = Advice::interceptor(Pass);
        let second = Advice::before(|_, _| Ok(()));
        advised.add_advice(first.clone()).unwrap();
        advised.add_advice_at(0, second.clone()).unwrap();

        assert_eq!(advised.index_of_advice(&second), Some(0));
        assert_eq!(advised.index_of_advice(&first), Some(1));
        assert!(advised.remove_advice(&second).unwrap());
        assert!(!advised.remove_advice(&second).unwrap());
        assert_eq!(advised.advisor_count(), 1);
    }

    #[test]
    fn test_introduction_registers_and_withdraws_interfaces() {
        let advised = AdvisedSupport::new();
        advised.add_interface(&STORE).unwrap();
        let introduction: Arc<dyn Advisor> = Arc::new(
            DefaultIntroductionAdvisor::new(Advice::introduction(Locker)).with_interface(&LOCKABLE),
        );

        advised.add_advisor(introduction.clone()).unwrap();
        assert!(advised.is_interface_proxied(&LOCKABLE));

        assert!(advised.remove_advisor_ref(&introduction).unwrap());
        assert!(!advised.is_interface_proxied(&LOCKABLE));
        assert!(advised.is_interface_proxied(&STORE));
    }

    #[test]
    fn test_invalid_introduction_is_rejected() {
        let advised = AdvisedSupport::new();
        let advisor = DefaultIntroductionAdvisor::new(Advice::introduction(Locker)).with_interface(&STORE);
        assert!(matches!(
            advised.add_advisor(Arc::new(advisor)),
            Err(AopError::Config(_))
        ));
        assert_eq!(advised.advisor_count(), 0);
    }

    #[derive(Default)]
    struct Recorder {
        activated: AtomicUsize,
        changed: AtomicUsize,
    }

    impl AdvisedSupportListener for Recorder {
        fn activated(&self, _advised: &AdvisedSupport) {
            self.activated.fetch_add(1, Ordering::SeqCst);
        }

        fn advice_changed(&self, _advised: &AdvisedSupport) {
            self.changed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_listeners_fire_after_activation() {
        let advised = AdvisedSupport::new();
        let recorder = Arc::new(Recorder::default());
        advised.add_listener(recorder.clone());

        advised.add_advice(Advice::interceptor(Pass)).unwrap();
        assert_eq!(recorder.changed.load(Ordering::SeqCst), 0);

        advised.activate();
        advised.activate();
        assert_eq!(recorder.activated.load(Ordering::SeqCst), 1);

        advised.add_advice(Advice::interceptor(Pass)).unwrap();
        advised.remove_advisor(0).unwrap();
        assert_eq!(recorder.changed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_copy_configuration() {
        let source = AdvisedSupport::new();
        source.add_interface(&STORE).unwrap();
        source.add_advice(Advice::interceptor(Pass)).unwrap();
        source.set_expose_proxy(true);

        let copy = AdvisedSupport::new();
        copy.copy_configuration_from(&source).unwrap();
        assert_eq!(copy.advisor_count(), 1);
        assert!(copy.is_interface_proxied(&STORE));
        assert!(copy.is_expose_proxy());
        assert!(copy.to_proxy_config_string().contains("1 advisor(s)"));
    }

    #[test]
    fn test_proxy_config_from_environment() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("test")
                .with_property("aop.proxy.expose-proxy", ConfigValue::Bool(true))
                .with_property("aop.proxy.frozen", ConfigValue::String("true".into())),
        ));

        let config = ProxyConfig::from_environment(&env).unwrap();
        assert!(config.expose_proxy);
        assert!(config.frozen);
        assert!(!config.proxy_target_class);

        let advised = AdvisedSupport::new();
        advised.apply_config(&config);
        assert_eq!(advised.config(), config);
    }
}
