//! 类型擦除的参数与返回值

use crate::dispatch::{Dispatch, ProxyInterface};
use crate::error::{AopError, AopResult};
use crate::metadata::Method;
use crate::proxy::AopProxy;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

/// 方法返回值，`None` 表示空值
pub type Value = Box<dyn Any + Send>;

type Slot = Arc<dyn Any + Send + Sync>;

/// 方法参数
///
/// 每个槽位共享存储，克隆参数列表（例如 `invocable_clone`）不会复制参数本身。
/// 目标通过 [`take`](Self::take) 取得参数的拷贝，因此参数类型需要实现 `Clone`。
#[derive(Clone, Default)]
pub struct Arguments {
    values: Vec<Slot>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.push(value);
        self
    }

    pub fn push<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.push(Arc::new(value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.values.get(index)?.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self, index: usize) -> bool {
        self.get::<T>(index).is_some()
    }

    /// 替换参数，索引越界时返回 `false`
    pub fn set<T: Any + Send + Sync>(&mut self, index: usize, value: T) -> bool {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = Arc::new(value);
                true
            }
            None => false,
        }
    }

    /// 以指定类型取出参数的拷贝
    pub fn take<T: Any + Clone>(&self, index: usize, method: &Method) -> AopResult<T> {
        let slot = self
            .values
            .get(index)
            .ok_or_else(|| AopError::ArgumentMismatch {
                method: method.to_string(),
                reason: format!("expected at least {} argument(s), got {}", index + 1, self.len()),
            })?;
        slot.downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| AopError::ArgumentMismatch {
                method: method.to_string(),
                reason: format!("argument {} is not of type {}", index, type_name::<T>()),
            })
    }

    /// 按方法签名调整参数
    ///
    /// 可变参数方法的调用方可能直接传入展开的尾部参数，这里把多出的参数
    /// 打包为 [`VarArgs`]。已经是 `VarArgs` 的参数保持不变。
    pub fn adapt_for(&mut self, method: &Method) {
        if !method.is_variadic() || method.param_count() == 0 {
            return;
        }
        let fixed = method.param_count() - 1;
        if self.values.len() == method.param_count() && self.is::<VarArgs>(fixed) {
            return;
        }
        if self.values.len() >= fixed {
            let tail = self.values.split_off(fixed);
            self.values.push(Arc::new(VarArgs { values: tail }));
        }
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Arguments({})", self.values.len())
    }
}

/// 可变参数
#[derive(Clone, Default)]
pub struct VarArgs {
    values: Vec<Slot>,
}

impl VarArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of<T: Any + Send + Sync>(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            values: items
                .into_iter()
                .map(|item| Arc::new(item) as Slot)
                .collect(),
        }
    }

    pub fn push<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.push(Arc::new(value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.values.get(index)?.downcast_ref::<T>()
    }

    /// 迭代所有类型为 `T` 的元素，其他类型被跳过
    pub fn iter<T: Any>(&self) -> impl Iterator<Item = &T> + '_ {
        self.values.iter().filter_map(|v| v.downcast_ref::<T>())
    }
}

impl fmt::Debug for VarArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VarArgs({})", self.values.len())
    }
}

/// 对象引用
///
/// 用于“返回自身”替换：目标返回指向自己的引用时，代理将其替换为指向代理的引用。
#[derive(Clone)]
pub enum ObjectRef {
    Object {
        address: usize,
        handle: Arc<dyn Any + Send + Sync>,
    },
    Proxy(Arc<dyn AopProxy>),
}

impl ObjectRef {
    /// 包装一个接口对象
    pub fn of<I: ?Sized + Send + Sync + 'static>(object: Arc<I>) -> Self {
        ObjectRef::Object {
            address: data_address(&object),
            handle: Arc::new(object),
        }
    }

    pub fn proxy(proxy: Arc<dyn AopProxy>) -> Self {
        ObjectRef::Proxy(proxy)
    }

    /// 所指对象的数据地址
    pub fn address(&self) -> usize {
        match self {
            ObjectRef::Object { address, .. } => *address,
            ObjectRef::Proxy(proxy) => data_address(proxy),
        }
    }

    pub fn is_same_as(&self, target: &Arc<dyn Dispatch>) -> bool {
        self.address() == data_address(target)
    }

    pub fn as_proxy(&self) -> Option<&Arc<dyn AopProxy>> {
        match self {
            ObjectRef::Proxy(proxy) => Some(proxy),
            ObjectRef::Object { .. } => None,
        }
    }

    pub fn downcast<I: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<I>> {
        match self {
            ObjectRef::Object { handle, .. } => handle.downcast_ref::<Arc<I>>().cloned(),
            ObjectRef::Proxy(_) => None,
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectRef::Object { address, .. } => write!(f, "ObjectRef::Object({:#x})", address),
            ObjectRef::Proxy(proxy) => write!(f, "ObjectRef::Proxy({})", proxy.target_class()),
        }
    }
}

/// `Arc` 所指数据的地址（忽略胖指针元数据）
pub fn data_address<T: ?Sized>(arc: &Arc<T>) -> usize {
    Arc::as_ptr(arc) as *const () as usize
}

// ========== 代理侧返回值转换 ==========

/// 非空返回值
pub fn value_of<T: Any>(method: &Method, value: Option<Value>) -> AopResult<T> {
    let value = value.ok_or_else(|| AopError::NullReturn {
        method: method.to_string(),
    })?;
    downcast_value(method, value)
}

/// 可空返回值
pub fn nullable_of<T: Any>(method: &Method, value: Option<Value>) -> AopResult<Option<T>> {
    value.map(|v| downcast_value(method, v)).transpose()
}

/// 返回接口对象的方法
pub fn object_of<I: ?Sized + ProxyInterface>(method: &Method, value: Option<Value>) -> AopResult<Arc<I>> {
    let object: ObjectRef = value_of(method, value)?;
    I::from_object(&object)
}

fn downcast_value<T: Any>(method: &Method, value: Value) -> AopResult<T> {
    value
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| AopError::ReturnTypeMismatch {
            method: method.to_string(),
            expected: type_name::<T>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ReturnType;

    static JOIN: Method = Method::new("Strings", "join", 0).with_params(2).variadic();
    static LEN: Method = Method::new("Strings", "len", 1)
        .with_params(1)
        .returns(ReturnType::Value, "usize");

    #[test]
    fn test_typed_access() {
        let mut args = Arguments::new().with(2_i32).with(String::from("x"));
        assert_eq!(args.get::<i32>(0), Some(&2));
        assert_eq!(args.get::<i64>(0), None);
        assert_eq!(args.take::<String>(1, &LEN).unwrap(), "x");

        assert!(args.set(0, 7_i32));
        assert!(!args.set(5, 7_i32));
        assert_eq!(args.get::<i32>(0), Some(&7));
    }

    #[test]
    fn test_take_reports_mismatch() {
        let args = Arguments::new().with(1_u8);
        let err = args.take::<String>(0, &LEN).unwrap_err();
        assert!(matches!(err, AopError::ArgumentMismatch { .. }));
        let err = args.take::<u8>(3, &LEN).unwrap_err();
        assert!(err.to_string().contains("expected at least 4"));
    }

    #[test]
    fn test_varargs_adaptation_packs_tail() {
        let mut args = Arguments::new()
            .with(String::from(","))
            .with(String::from("a"))
            .with(String::from("b"));
        args.adapt_for(&JOIN);

        assert_eq!(args.len(), 2);
        let tail = args.get::<VarArgs>(1).unwrap();
        let items: Vec<_> = tail.iter::<String>().cloned().collect();
        assert_eq!(items, vec!["a", "b"]);
    }

    #[test]
    fn test_varargs_adaptation_keeps_packed_arguments() {
        let mut args = Arguments::new()
            .with(String::from(","))
            .with(VarArgs::of(vec![1_i32, 2, 3]));
        args.adapt_for(&JOIN);

        assert_eq!(args.len(), 2);
        assert_eq!(args.get::<VarArgs>(1).unwrap().len(), 3);

        let mut empty_tail = Arguments::new().with(String::from(","));
        empty_tail.adapt_for(&JOIN);
        assert!(empty_tail.get::<VarArgs>(1).unwrap().is_empty());
    }

    #[test]
    fn test_return_conversion() {
        assert_eq!(value_of::<usize>(&LEN, Some(Box::new(3_usize))).unwrap(), 3);
        assert!(matches!(
            value_of::<usize>(&LEN, None),
            Err(AopError::NullReturn { .. })
        ));
        assert!(matches!(
            value_of::<usize>(&LEN, Some(Box::new("three"))),
            Err(AopError::ReturnTypeMismatch { .. })
        ));
        assert_eq!(nullable_of::<usize>(&LEN, None).unwrap(), None);
    }

    #[test]
    fn test_object_ref_identity() {
        let shared: Arc<String> = Arc::new("target".to_string());
        let object = ObjectRef::of(shared.clone());
        assert_eq!(object.address(), data_address(&shared));
        assert!(Arc::ptr_eq(&object.downcast::<String>().unwrap(), &shared));
        assert!(object.as_proxy().is_none());
    }
}
