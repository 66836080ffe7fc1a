//! 故障（Fault）模型
//!
//! 目标方法与拦截器抛出的业务失败统一表示为 [`Fault`]。
//! 每个故障属于一个 [`FaultKind`]，故障类型组成一棵以 [`kinds::THROWABLE`] 为根的继承树，
//! 异常通知按这棵树向上查找最近的处理器。
//!
//! 故障类型必须声明为 `static`，比较时按地址判等。

use std::fmt;
use std::sync::Arc;

/// 故障类型
#[derive(Debug)]
pub struct FaultKind {
    name: &'static str,
    parent: Option<&'static FaultKind>,
    checked: bool,
}

impl FaultKind {
    /// 声明一个故障类型
    ///
    /// ```ignore
    /// static INSUFFICIENT_FUNDS: FaultKind =
    ///     FaultKind::new("InsufficientFunds", Some(&kinds::EXCEPTION), true);
    /// ```
    pub const fn new(name: &'static str, parent: Option<&'static FaultKind>, checked: bool) -> Self {
        Self {
            name,
            parent,
            checked,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static FaultKind> {
        self.parent
    }

    /// 受检故障必须出现在方法的声明列表中，否则在代理边界被包装
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// 从自身开始，沿父类型链向上遍历
    pub fn ancestry(&'static self) -> impl Iterator<Item = &'static FaultKind> {
        std::iter::successors(Some(self), |kind| kind.parent)
    }

    /// `self` 是否为 `other` 或其子类型
    pub fn is_a(&self, other: &FaultKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if std::ptr::eq(kind, other) {
                return true;
            }
            current = kind.parent.map(|p| p as &FaultKind);
        }
        false
    }

    /// 到 `ancestor` 的继承距离，不相关时返回 `None`
    pub fn depth_to(&self, ancestor: &FaultKind) -> Option<usize> {
        let mut current = Some(self);
        let mut depth = 0;
        while let Some(kind) = current {
            if std::ptr::eq(kind, ancestor) {
                return Some(depth);
            }
            depth += 1;
            current = kind.parent.map(|p| p as &FaultKind);
        }
        None
    }
}

impl PartialEq for FaultKind {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for FaultKind {}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 内置故障类型
pub mod kinds {
    use super::FaultKind;

    pub static THROWABLE: FaultKind = FaultKind::new("Throwable", None, true);
    pub static EXCEPTION: FaultKind = FaultKind::new("Exception", Some(&THROWABLE), true);
    pub static RUNTIME: FaultKind = FaultKind::new("RuntimeException", Some(&EXCEPTION), false);
    pub static ERROR: FaultKind = FaultKind::new("Error", Some(&THROWABLE), false);

    pub static ARITHMETIC: FaultKind = FaultKind::new("ArithmeticException", Some(&RUNTIME), false);
    pub static ILLEGAL_ARGUMENT: FaultKind =
        FaultKind::new("IllegalArgumentException", Some(&RUNTIME), false);
    pub static ILLEGAL_STATE: FaultKind =
        FaultKind::new("IllegalStateException", Some(&RUNTIME), false);
    pub static IO: FaultKind = FaultKind::new("IOException", Some(&EXCEPTION), true);

    /// 引擎自身的配置错误
    pub static AOP_CONFIG: FaultKind = FaultKind::new("AopConfigException", Some(&RUNTIME), false);
    /// 引擎在调用期间检测到的契约错误
    pub static AOP_INVOCATION: FaultKind =
        FaultKind::new("AopInvocationException", Some(&RUNTIME), false);
    pub static UNDECLARED_THROWABLE: FaultKind =
        FaultKind::new("UndeclaredThrowableException", Some(&RUNTIME), false);
}

/// 一次具体的故障
#[derive(Debug, Clone)]
pub struct Fault {
    kind: &'static FaultKind,
    message: String,
    cause: Option<Arc<anyhow::Error>>,
}

impl Fault {
    pub fn new(kind: &'static FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<anyhow::Error>) -> Self {
        self.cause = Some(Arc::new(cause.into()));
        self
    }

    pub fn kind(&self) -> &'static FaultKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_deref()
    }

    pub fn is_checked(&self) -> bool {
        self.kind.is_checked()
    }

    pub fn is_a(&self, kind: &FaultKind) -> bool {
        self.kind.is_a(kind)
    }

    /// 完整描述，包含原因链
    pub fn full_description(&self) -> String {
        let mut chain = Vec::new();
        let mut current = std::error::Error::source(self);
        while let Some(source) = current {
            chain.push(source.to_string());
            current = source.source();
        }

        if chain.is_empty() {
            self.to_string()
        } else {
            format!("{}\nCaused by:\n  {}", self, chain.join("\n  "))
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name, self.message)
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| AsRef::<dyn std::error::Error>::as_ref(cause))
    }
}
