//! 代理生成
//!
//! 两种策略：
//!
//! - **接口代理**（[`InterfaceProxy`]）：对目标接口与标记接口的并集建立分派表，
//!   所有调用经过同一个分派函数。
//! - **子类代理**（[`ClassProxy`]）：以目标类的全部可覆盖方法建立槽位，每个槽位在生成时
//!   决定调用方式。静态目标且配置已冻结时，拦截链在生成时计算一次并固化到槽位中。
//!
//! 由 [`DefaultAopProxyFactory`] 按配置选择策略。

mod class;
mod interface;
mod support;
pub mod utils;

pub use class::ClassProxy;
pub use interface::InterfaceProxy;

use crate::advised::AdvisedSupport;
use crate::arguments::{Arguments, Value};
use crate::dispatch::Dispatch;
use crate::error::{AopError, AopResult};
use crate::metadata::{Interface, Method, TargetClass};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 代理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStrategy {
    Interface,
    Class,
}

impl fmt::Display for ProxyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyStrategy::Interface => f.write_str("interface"),
            ProxyStrategy::Class => f.write_str("class"),
        }
    }
}

/// 引擎生成的代理
pub trait AopProxy: Dispatch {
    /// 经过拦截链调用方法
    fn invoke(&self, method: &'static Method, args: Arguments) -> AopResult<Option<Value>>;

    /// 代理配置；不透明代理返回 `None`
    fn advised(&self) -> Option<&Arc<AdvisedSupport>>;

    /// 代理实现的全部接口，包括标记接口
    fn proxied_interfaces(&self) -> &[&'static Interface];

    fn exposes(&self, interface: &Interface) -> bool {
        self.proxied_interfaces().iter().any(|i| *i == interface)
    }

    /// 被装饰的目标类
    fn decorated_class(&self) -> Option<Arc<TargetClass>>;

    fn strategy(&self) -> ProxyStrategy;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn as_dispatch(self: Arc<Self>) -> Arc<dyn Dispatch>;
}

impl fmt::Debug for dyn AopProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AopProxy")
            .field("strategy", &self.strategy())
            .field("class", &self.target_class().name())
            .finish()
    }
}

/// 代理工厂
pub trait AopProxyFactory: Send + Sync {
    /// 按配置生成代理，`constructor_args` 仅用于子类代理
    fn create_aop_proxy(
        &self,
        advised: Arc<AdvisedSupport>,
        constructor_args: Option<Arguments>,
    ) -> AopResult<Arc<dyn AopProxy>>;
}

/// 默认代理工厂
///
/// 开启优化、要求代理目标类、或者没有用户声明的接口时使用子类代理；
/// 目标本身就是接口代理时仍使用接口代理。其余情况使用接口代理。
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAopProxyFactory;

impl DefaultAopProxyFactory {
    pub fn select_strategy(&self, advised: &AdvisedSupport) -> AopResult<ProxyStrategy> {
        let no_user_interfaces = utils::has_no_user_supplied_interfaces(advised);
        if !(advised.is_optimize() || advised.is_proxy_target_class() || no_user_interfaces) {
            return Ok(ProxyStrategy::Interface);
        }

        match advised.target_class() {
            None if advised.interfaces().is_empty() => Err(AopError::NoTargetClass),
            None => Ok(ProxyStrategy::Interface),
            Some(class) if class.is_proxy_class() => Ok(ProxyStrategy::Interface),
            Some(_) => Ok(ProxyStrategy::Class),
        }
    }
}

impl AopProxyFactory for DefaultAopProxyFactory {
    fn create_aop_proxy(
        &self,
        advised: Arc<AdvisedSupport>,
        constructor_args: Option<Arguments>,
    ) -> AopResult<Arc<dyn AopProxy>> {
        match self.select_strategy(&advised)? {
            ProxyStrategy::Interface => Ok(InterfaceProxy::new(advised)),
            ProxyStrategy::Class => {
                ClassProxy::new(advised, constructor_args).map(|proxy| proxy as Arc<dyn AopProxy>)
            }
        }
    }
}
