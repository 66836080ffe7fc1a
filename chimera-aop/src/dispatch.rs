//! 动态分派
//!
//! [`Dispatch`] 是每个可被代理的对象实现的适配 trait：给定方法描述符和参数，
//! 调用真实的方法。代理自身也实现 `Dispatch`，因此代理可以作为另一个代理的目标。

use crate::arguments::{Arguments, ObjectRef, Value};
use crate::error::{AopError, AopResult};
use crate::metadata::{markers, Interface, Method, TargetClass};
use crate::proxy::AopProxy;
use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 可被分派调用的对象
pub trait Dispatch: Send + Sync + 'static {
    /// 对象的运行时类
    fn target_class(&self) -> Arc<TargetClass>;

    /// 调用方法
    fn dispatch(&self, method: &'static Method, args: &Arguments) -> AopResult<Option<Value>>;

    fn as_any(&self) -> &dyn Any;

    /// 对象本身是引擎生成的代理时返回代理视图
    fn as_aop_proxy(&self) -> Option<&dyn AopProxy> {
        None
    }

    /// 相等比较，类声明了 `with_equality` 时代理经拦截链调用它；默认按地址比较
    fn equals(&self, other: &Arc<dyn Dispatch>) -> bool {
        std::ptr::eq(self as *const Self as *const (), Arc::as_ptr(other) as *const ())
    }

    /// 哈希值，类声明了 `with_hash` 时代理经拦截链调用它
    fn hash_code(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        (self as *const Self as *const () as usize).hash(&mut hasher);
        hasher.finish()
    }
}

/// 可代理接口
///
/// 由 `#[proxied]` 为 `dyn Trait` 生成实现，不需要手写。
pub trait ProxyInterface: Send + Sync + 'static {
    /// 接口的方法表
    fn interface() -> &'static Interface;

    /// 在具体目标上调用接口方法
    fn dispatch(target: &Self, method: &'static Method, args: &Arguments) -> AopResult<Option<Value>>;

    /// 把代理视为此接口
    fn from_proxy(proxy: Arc<dyn AopProxy>) -> AopResult<Arc<Self>>;

    /// 把方法返回的对象引用还原为接口对象
    fn from_object(object: &ObjectRef) -> AopResult<Arc<Self>> {
        match object {
            ObjectRef::Proxy(proxy) => Self::from_proxy(proxy.clone()),
            ObjectRef::Object { .. } => {
                object
                    .downcast::<Self>()
                    .ok_or_else(|| AopError::ReturnTypeMismatch {
                        method: Self::interface().name().to_string(),
                        expected: std::any::type_name::<Arc<Self>>(),
                    })
            }
        }
    }
}

/// 在目标上调用方法
///
/// 拦截链的终点。[`markers::IDENTITY`] 的方法转给目标的 [`Dispatch::equals`] 与
/// [`Dispatch::hash_code`]，其余方法交给 [`Dispatch::dispatch`]。
pub fn invoke_method(
    target: &Arc<dyn Dispatch>,
    method: &'static Method,
    args: &Arguments,
) -> AopResult<Option<Value>> {
    if !markers::IDENTITY.declares(method) {
        return target.dispatch(method, args);
    }
    let value: Value = match method.name() {
        "equals" => {
            let other: Arc<dyn Dispatch> = args.take(0, method)?;
            Box::new(target.equals(&other))
        }
        _ => Box::new(target.hash_code()),
    };
    Ok(Some(value))
}

/// 具有静态类描述符的目标类型，由 [`impl_target!`](crate::impl_target) 实现
pub trait TargetType: Dispatch + Sized {
    fn class() -> Arc<TargetClass>;
}

/// 代理检查：代理必须暴露目标接口
pub fn ensure_exposes(proxy: &dyn AopProxy, interface: &Interface) -> AopResult<()> {
    if proxy.exposes(interface) {
        Ok(())
    } else {
        Err(AopError::Config(format!(
            "Proxy for [{}] does not implement interface [{}]",
            proxy.target_class(),
            interface
        )))
    }
}

/// 为结构体实现 [`Dispatch`] 与 [`TargetType`]
///
/// ```ignore
/// impl_target!(CalculatorImpl: dyn Calculator);
///
/// impl_target!(
///     AccountService => TargetClass::of::<AccountService>("AccountService").final_class();
///     dyn Accounts, dyn Auditable
/// );
/// ```
#[macro_export]
macro_rules! impl_target {
    ($ty:ty => $class:expr; $($iface:ty),+ $(,)?) => {
        impl $crate::TargetType for $ty {
            fn class() -> ::std::sync::Arc<$crate::TargetClass> {
                static CLASS: $crate::__private::Lazy<::std::sync::Arc<$crate::TargetClass>> =
                    $crate::__private::Lazy::new(|| {
                        ::std::sync::Arc::new(
                            ($class)$(.implements(<$iface as $crate::ProxyInterface>::interface()))+,
                        )
                    });
                ::std::sync::Arc::clone(&CLASS)
            }
        }

        impl $crate::Dispatch for $ty {
            fn target_class(&self) -> ::std::sync::Arc<$crate::TargetClass> {
                <$ty as $crate::TargetType>::class()
            }

            fn dispatch(
                &self,
                method: &'static $crate::Method,
                args: &$crate::Arguments,
            ) -> $crate::AopResult<::std::option::Option<$crate::Value>> {
                $(
                    if <$iface as $crate::ProxyInterface>::interface().declares(method) {
                        return <$iface as $crate::ProxyInterface>::dispatch(self, method, args);
                    }
                )+
                ::std::result::Result::Err($crate::AopError::MethodNotProxied {
                    method: method.to_string(),
                })
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    };
    ($ty:ty: $($iface:ty),+ $(,)?) => {
        $crate::impl_target!(
            $ty => $crate::TargetClass::of::<$ty>(stringify!($ty));
            $($iface),+
        );
    };
}
