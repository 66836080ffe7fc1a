//! AOP 引擎错误类型

use crate::fault::{kinds, Fault, FaultKind};
use thiserror::Error;

/// AOP 引擎错误
///
/// 分为三类：配置错误（立即报告，不重试）、调用期错误、以及目标或拦截器抛出的 [`Fault`]。
#[derive(Debug, Error)]
pub enum AopError {
    // ---------- 配置错误 ----------
    /// 冻结的配置不允许修改通知链
    #[error("Cannot {operation}: configuration is frozen")]
    Frozen { operation: &'static str },

    #[error("Advisor index {index} is out of range (advisor count: {count})")]
    AdvisorIndexOutOfRange { index: usize, count: usize },

    /// 没有适配器能识别的通知对象
    #[error("Advice object [{0}] is neither a supported advice type nor an Advisor")]
    UnknownAdviceType(String),

    #[error("AOP configuration error: {0}")]
    Config(String),

    /// 代理生成失败（final 类、无可用构造器等），不会降级为另一种策略
    #[error("Could not generate proxy for class [{class}]: {reason}")]
    ProxyGeneration { class: String, reason: String },

    #[error("TargetSource cannot determine target class: either an interface or a target is required for proxy creation")]
    NoTargetClass,

    // ---------- 调用期错误 ----------
    /// 非空返回类型的方法从拦截链得到了空值
    #[error("Null return value from advice does not match non-nullable return type for: {method}")]
    NullReturn { method: String },

    /// 拦截器抛出了方法签名未声明的受检故障
    #[error("Undeclared checked fault thrown from {method}: {fault}")]
    UndeclaredThrowable {
        method: String,
        #[source]
        fault: Box<Fault>,
    },

    #[error("Cannot find current proxy: set 'expose-proxy' to true on the proxy configuration to make it available")]
    ProxyNotExposed,

    #[error("Method {method} is not implemented by this proxy")]
    MethodNotProxied { method: String },

    #[error("Argument mismatch for {method}: {reason}")]
    ArgumentMismatch { method: String, reason: String },

    #[error("Return value of {method} is not of the expected type {expected}")]
    ReturnTypeMismatch {
        method: String,
        expected: &'static str,
    },

    #[error("No target available for invocation of {method}")]
    MissingTarget { method: String },

    #[error("TargetSource failure: {0}")]
    TargetSource(String),

    // ---------- 业务故障 ----------
    #[error(transparent)]
    Fault(#[from] Fault),
}

impl AopError {
    /// 错误在故障继承树中的类型，供异常通知匹配处理器
    pub fn kind(&self) -> &'static FaultKind {
        match self {
            AopError::Fault(fault) => fault.kind(),
            AopError::UndeclaredThrowable { .. } => &kinds::UNDECLARED_THROWABLE,
            e if e.is_configuration_error() => &kinds::AOP_CONFIG,
            _ => &kinds::AOP_INVOCATION,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            AopError::Frozen { .. }
                | AopError::AdvisorIndexOutOfRange { .. }
                | AopError::UnknownAdviceType(_)
                | AopError::Config(_)
                | AopError::ProxyGeneration { .. }
                | AopError::NoTargetClass
        )
    }

    /// 如果是业务故障，返回故障本身
    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            AopError::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        AopError::Config(message.into())
    }
}

/// AOP 结果类型
pub type AopResult<T> = std::result::Result<T, AopError>;
