//! 通知器（Advisor）：通知与切点的组合

use crate::advice::Advice;
use crate::error::{AopError, AopResult};
use crate::metadata::Interface;
use crate::pointcut::{ClassFilter, Pointcut, TrueClassFilter, TruePointcut};
use std::fmt;
use std::sync::Arc;

/// 未指定顺序的通知器
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// 通知器形态
pub enum AdvisorKind<'a> {
    /// 由切点决定作用范围
    Pointcut(&'a dyn Pointcut),
    /// 为代理引入新接口，类过滤器匹配后对所有方法生效
    Introduction {
        class_filter: Arc<dyn ClassFilter>,
        interfaces: &'a [&'static Interface],
    },
    /// 无条件作用于所有方法
    Global,
}

/// 通知器
pub trait Advisor: Send + Sync {
    fn advice(&self) -> &Advice;

    fn kind(&self) -> AdvisorKind<'_>;

    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }

    /// 结果是否取决于具体方法；全部通知器都与方法无关时，
    /// 拦截链可以在所有方法之间共享
    fn is_method_specific(&self) -> bool {
        match self.kind() {
            AdvisorKind::Pointcut(pointcut) => {
                !(pointcut.class_filter().is_universal() && pointcut.method_matcher().is_universal())
            }
            AdvisorKind::Introduction { .. } | AdvisorKind::Global => false,
        }
    }

    /// 校验引入通知器，并返回其引入的接口
    fn validate_introduction(&self) -> AopResult<Vec<&'static Interface>> {
        Ok(Vec::new())
    }

    fn describe(&self) -> String {
        match self.kind() {
            AdvisorKind::Pointcut(pointcut) => {
                format!("{} [{}]", pointcut.describe(), self.advice().describe())
            }
            AdvisorKind::Introduction { interfaces, .. } => format!(
                "Introduction{:?} [{}]",
                interfaces.iter().map(|i| i.name()).collect::<Vec<_>>(),
                self.advice().describe()
            ),
            AdvisorKind::Global => format!("Global [{}]", self.advice().describe()),
        }
    }
}

impl fmt::Debug for dyn Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// 切点通知器
pub struct DefaultPointcutAdvisor {
    pointcut: Arc<dyn Pointcut>,
    advice: Advice,
    order: Option<i32>,
}

impl DefaultPointcutAdvisor {
    /// 匹配所有方法的通知器
    pub fn new(advice: Advice) -> Self {
        Self::with_pointcut(Arc::new(TruePointcut), advice)
    }

    pub fn with_pointcut(pointcut: Arc<dyn Pointcut>, advice: Advice) -> Self {
        Self {
            pointcut,
            advice,
            order: None,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn pointcut(&self) -> &Arc<dyn Pointcut> {
        &self.pointcut
    }
}

impl Advisor for DefaultPointcutAdvisor {
    fn advice(&self) -> &Advice {
        &self.advice
    }

    fn kind(&self) -> AdvisorKind<'_> {
        AdvisorKind::Pointcut(self.pointcut.as_ref())
    }

    fn order(&self) -> i32 {
        self.order.unwrap_or(LOWEST_PRECEDENCE)
    }
}

/// 引入通知器
pub struct DefaultIntroductionAdvisor {
    advice: Advice,
    interfaces: Vec<&'static Interface>,
    class_filter: Arc<dyn ClassFilter>,
    order: Option<i32>,
}

impl DefaultIntroductionAdvisor {
    /// `advice` 应为 [`Advice::Introduction`]，在加入配置时校验
    pub fn new(advice: Advice) -> Self {
        Self {
            advice,
            interfaces: Vec::new(),
            class_filter: Arc::new(TrueClassFilter),
            order: None,
        }
    }

    pub fn with_interface(mut self, interface: &'static Interface) -> Self {
        if !self.interfaces.iter().any(|i| *i == interface) {
            self.interfaces.push(interface);
        }
        self
    }

    pub fn with_class_filter(mut self, class_filter: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = class_filter;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn interfaces(&self) -> &[&'static Interface] {
        &self.interfaces
    }
}

impl Advisor for DefaultIntroductionAdvisor {
    fn advice(&self) -> &Advice {
        &self.advice
    }

    fn kind(&self) -> AdvisorKind<'_> {
        AdvisorKind::Introduction {
            class_filter: self.class_filter.clone(),
            interfaces: &self.interfaces,
        }
    }

    fn order(&self) -> i32 {
        self.order.unwrap_or(LOWEST_PRECEDENCE)
    }

    fn validate_introduction(&self) -> AopResult<Vec<&'static Interface>> {
        let interceptor = match &self.advice {
            Advice::Introduction(interceptor) => interceptor,
            other => {
                return Err(AopError::Config(format!(
                    "Introduction advisor requires introduction advice, got [{}]",
                    other.describe()
                )))
            }
        };
        if self.interfaces.is_empty() {
            return Err(AopError::config(
                "Introduction advisor must introduce at least one interface",
            ));
        }
        for interface in &self.interfaces {
            if interface.is_class_surface() {
                return Err(AopError::Config(format!(
                    "Class [{}] is not an interface and cannot be introduced",
                    interface
                )));
            }
            if !interceptor.implements_interface(interface) {
                return Err(AopError::Config(format!(
                    "Introduction advice [{}] does not implement interface [{}] specified for introduction",
                    interceptor.describe(),
                    interface
                )));
            }
        }
        Ok(self.interfaces.clone())
    }
}

/// 无切点的全局通知器
pub struct GlobalAdvisor {
    advice: Advice,
}

impl GlobalAdvisor {
    pub fn new(advice: Advice) -> Self {
        Self { advice }
    }
}

impl Advisor for GlobalAdvisor {
    fn advice(&self) -> &Advice {
        &self.advice
    }

    fn kind(&self) -> AdvisorKind<'_> {
        AdvisorKind::Global
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcut::NameMatchMethodPointcut;

    #[test]
    fn test_method_specific_detection() {
        let everything = DefaultPointcutAdvisor::new(Advice::before(|_, _| Ok(())));
        assert!(!everything.is_method_specific());

        let named = DefaultPointcutAdvisor::with_pointcut(
            Arc::new(NameMatchMethodPointcut::new().with_name("add")),
            Advice::before(|_, _| Ok(())),
        )
        .with_order(5);
        assert!(named.is_method_specific());
        assert_eq!(named.order(), 5);

        let global = GlobalAdvisor::new(Advice::after(|_, _| Ok(())));
        assert!(!global.is_method_specific());
        assert_eq!(global.order(), LOWEST_PRECEDENCE);
    }

    #[test]
    fn test_introduction_requires_introduction_advice() {
        let advisor = DefaultIntroductionAdvisor::new(Advice::before(|_, _| Ok(())));
        assert!(matches!(
            advisor.validate_introduction(),
            Err(AopError::Config(_))
        ));
    }
}
