//! 拦截链解析
//!
//! 按声明顺序遍历通知器：切点通知器先过类过滤器（预过滤时跳过）再过方法匹配器，
//! 动态匹配器与拦截器打包成延迟匹配条目；引入通知器在类过滤器匹配后无条件加入；
//! 其余通知器无条件加入。

use crate::advice::MethodInterceptor;
use crate::advisor::{Advisor, AdvisorKind};
use crate::error::AopResult;
use crate::metadata::{Method, TargetClass};
use crate::pointcut::MethodMatcher;
use crate::registry::{global_adapter_registry, AdviceAdapterRegistry};
use std::fmt;
use std::sync::Arc;

/// 拦截链条目
#[derive(Clone)]
pub enum ChainEntry {
    Interceptor(Arc<dyn MethodInterceptor>),
    /// 需要用实际参数再次匹配的拦截器
    Dynamic {
        interceptor: Arc<dyn MethodInterceptor>,
        matcher: Arc<dyn MethodMatcher>,
    },
}

impl ChainEntry {
    pub fn interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        match self {
            ChainEntry::Interceptor(interceptor) => interceptor,
            ChainEntry::Dynamic { interceptor, .. } => interceptor,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ChainEntry::Dynamic { .. })
    }
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainEntry::Interceptor(i) => write!(f, "Interceptor({})", i.describe()),
            ChainEntry::Dynamic { interceptor, .. } => write!(f, "Dynamic({})", interceptor.describe()),
        }
    }
}

/// 不可变的拦截链
pub type Chain = Arc<[ChainEntry]>;

/// 拦截链工厂
pub trait AdvisorChainFactory: Send + Sync {
    /// 计算方法的拦截链
    ///
    /// `target_class` 为空时以方法的声明接口合成一个类描述符。
    fn interceptor_chain(
        &self,
        advisors: &[Arc<dyn Advisor>],
        pre_filtered: bool,
        method: &'static Method,
        target_class: Option<&TargetClass>,
    ) -> AopResult<Chain>;
}

/// 默认拦截链工厂
pub struct DefaultAdvisorChainFactory {
    registry: Arc<AdviceAdapterRegistry>,
}

impl DefaultAdvisorChainFactory {
    /// 使用全局适配器注册表
    pub fn new() -> Self {
        Self {
            registry: Arc::clone(global_adapter_registry()),
        }
    }

    pub fn with_registry(registry: Arc<AdviceAdapterRegistry>) -> Self {
        Self { registry }
    }
}

impl Default for DefaultAdvisorChainFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisorChainFactory for DefaultAdvisorChainFactory {
    fn interceptor_chain(
        &self,
        advisors: &[Arc<dyn Advisor>],
        pre_filtered: bool,
        method: &'static Method,
        target_class: Option<&TargetClass>,
    ) -> AopResult<Chain> {
        let synthesized;
        let class = match target_class {
            Some(class) => class,
            None => {
                synthesized = TargetClass::new(method.declaring());
                &synthesized
            }
        };

        let mut chain = Vec::with_capacity(advisors.len());
        for advisor in advisors {
            match advisor.kind() {
                AdvisorKind::Pointcut(pointcut) => {
                    if !pre_filtered && !pointcut.class_filter().matches(class) {
                        continue;
                    }
                    let matcher = pointcut.method_matcher();
                    if !matcher.matches(method, class) {
                        continue;
                    }
                    let interceptors = self.registry.interceptors(advisor.as_ref())?;
                    if matcher.is_runtime() {
                        chain.extend(interceptors.into_iter().map(|interceptor| ChainEntry::Dynamic {
                            interceptor,
                            matcher: Arc::clone(&matcher),
                        }));
                    } else {
                        chain.extend(interceptors.into_iter().map(ChainEntry::Interceptor));
                    }
                }
                AdvisorKind::Introduction { class_filter, .. } => {
                    if pre_filtered || class_filter.matches(class) {
                        let interceptors = self.registry.interceptors(advisor.as_ref())?;
                        chain.extend(interceptors.into_iter().map(ChainEntry::Interceptor));
                    }
                }
                AdvisorKind::Global => {
                    let interceptors = self.registry.interceptors(advisor.as_ref())?;
                    chain.extend(interceptors.into_iter().map(ChainEntry::Interceptor));
                }
            }
        }

        tracing::trace!(
            "Resolved {} interceptor(s) for {} on {}",
            chain.len(),
            method,
            class
        );
        Ok(chain.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::advisor::{DefaultPointcutAdvisor, GlobalAdvisor};
    use crate::arguments::Value;
    use crate::joinpoint::MethodInvocation;
    use crate::metadata::{Interface, ReturnType};
    use crate::pointcut::{
        ComposablePointcut, DynamicMethodMatcher, NameMatchMethodPointcut, TypeNameClassFilter,
    };
    use std::any::TypeId;

    struct OpsTag;

    fn ops_id() -> TypeId {
        TypeId::of::<OpsTag>()
    }

    static OPS_METHODS: [Method; 2] = [
        Method::new("Ops", "add", 0).with_params(2).returns(ReturnType::Value, "i32"),
        Method::new("Ops", "sub", 1).with_params(2).returns(ReturnType::Value, "i32"),
    ];
    static OPS: Interface = Interface::new("Ops", &OPS_METHODS, ops_id);

    struct Named(&'static str);

    impl MethodInterceptor for Named {
        fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
            invocation.proceed()
        }

        fn describe(&self) -> String {
            self.0.to_string()
        }
    }

    fn named(name: &'static str) -> Advice {
        Advice::interceptor(Named(name))
    }

    fn names(chain: &Chain) -> Vec<String> {
        chain.iter().map(|e| e.interceptor().describe()).collect()
    }

    fn add() -> &'static Method {
        OPS.method("add").unwrap()
    }

    fn class() -> TargetClass {
        TargetClass::new("OpsImpl").implements(&OPS)
    }

    fn only(method: &str, advice: Advice) -> Arc<dyn Advisor> {
        Arc::new(DefaultPointcutAdvisor::with_pointcut(
            Arc::new(NameMatchMethodPointcut::new().with_name(method)),
            advice,
        ))
    }

    #[test]
    fn test_chain_preserves_advisor_order_restricted_to_matches() {
        let advisors: Vec<Arc<dyn Advisor>> = vec![
            only("add", named("a")),
            only("sub", named("b")),
            Arc::new(GlobalAdvisor::new(named("c"))),
            only("*", named("d")),
            only("add", named("e")),
        ];
        let factory = DefaultAdvisorChainFactory::new();

        let chain = factory
            .interceptor_chain(&advisors, false, add(), Some(&class()))
            .unwrap();
        assert_eq!(names(&chain), vec!["a", "c", "d", "e"]);

        let sub = OPS.method("sub").unwrap();
        let chain = factory
            .interceptor_chain(&advisors, false, sub, Some(&class()))
            .unwrap();
        assert_eq!(names(&chain), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_class_filter_skipped_when_pre_filtered() {
        let filtered = ComposablePointcut::with_class_filter(Arc::new(TypeNameClassFilter::new("Other*")));
        let advisors: Vec<Arc<dyn Advisor>> = vec![Arc::new(DefaultPointcutAdvisor::with_pointcut(
            Arc::new(filtered),
            named("x"),
        ))];
        let factory = DefaultAdvisorChainFactory::new();

        let chain = factory
            .interceptor_chain(&advisors, false, add(), Some(&class()))
            .unwrap();
        assert!(chain.is_empty());

        let chain = factory
            .interceptor_chain(&advisors, true, add(), Some(&class()))
            .unwrap();
        assert_eq!(names(&chain), vec!["x"]);
    }

    #[test]
    fn test_dynamic_matcher_produces_deferred_entry() {
        let dynamic = ComposablePointcut::with_method_matcher(Arc::new(DynamicMethodMatcher::new(
            |_, args| args.get::<i32>(0).map_or(false, |n| *n > 0),
        )));
        let advisors: Vec<Arc<dyn Advisor>> = vec![
            Arc::new(DefaultPointcutAdvisor::with_pointcut(Arc::new(dynamic), named("dyn"))),
            only("add", named("static")),
        ];

        let chain = DefaultAdvisorChainFactory::new()
            .interceptor_chain(&advisors, false, add(), None)
            .unwrap();
        assert_eq!(chain.len(), 2);
        assert!(chain[0].is_dynamic());
        assert!(!chain[1].is_dynamic());
    }

    #[test]
    fn test_before_advice_adapted_into_chain() {
        let advisors: Vec<Arc<dyn Advisor>> = vec![Arc::new(DefaultPointcutAdvisor::new(
            Advice::before(|_, _| Ok(())),
        ))];
        let chain = DefaultAdvisorChainFactory::new()
            .interceptor_chain(&advisors, false, add(), Some(&class()))
            .unwrap();
        assert_eq!(chain.len(), 1);
        assert!(chain[0].interceptor().describe().starts_with("MethodBeforeAdviceInterceptor"));
    }
}
