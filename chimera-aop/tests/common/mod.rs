//! 集成测试共用的接口与目标

#![allow(dead_code)]

use chimera_aop::prelude::*;
use chimera_aop_macros::proxied;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Weak;

#[proxied]
pub trait Calculator {
    fn add(&self, a: i32, b: i32) -> AopResult<i32>;

    fn divide(&self, a: i32, b: i32) -> AopResult<i32>;

    /// 通过当前代理调用 `add`
    fn twice(&self, a: i32) -> AopResult<i32>;

    fn label(&self) -> AopResult<Option<String>>;

    fn sum(&self, base: i32, values: VarArgs) -> AopResult<i32>;

    #[throws(kinds::IO)]
    fn load(&self, name: String) -> AopResult<String>;
}

/// 计算器目标，`offset` 用于区分不同实例
#[derive(Default)]
pub struct CalculatorImpl {
    offset: i32,
    calls: AtomicUsize,
}

impl CalculatorImpl {
    pub fn with_offset(offset: i32) -> Self {
        Self {
            offset,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Calculator for CalculatorImpl {
    fn add(&self, a: i32, b: i32) -> AopResult<i32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(a + b + self.offset)
    }

    fn divide(&self, a: i32, b: i32) -> AopResult<i32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if b == 0 {
            return Err(Fault::new(&kinds::ARITHMETIC, "/ by zero").into());
        }
        Ok(a / b)
    }

    fn twice(&self, a: i32) -> AopResult<i32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let me = ProxyContext::current::<dyn Calculator>()?;
        me.add(a, a)
    }

    fn label(&self) -> AopResult<Option<String>> {
        Ok(None)
    }

    fn sum(&self, base: i32, values: VarArgs) -> AopResult<i32> {
        Ok(base + values.iter::<i32>().sum::<i32>())
    }

    fn load(&self, name: String) -> AopResult<String> {
        if name.is_empty() {
            return Err(Fault::new(&kinds::IO, "empty name").into());
        }
        Ok(format!("loaded {}", name))
    }
}

impl_target!(CalculatorImpl: dyn Calculator);

#[proxied]
pub trait Builder {
    fn with_part(&self, part: String) -> AopResult<Arc<dyn Builder>>;

    fn parts(&self) -> AopResult<Vec<String>>;
}

/// 返回自身的目标
pub struct BuilderImpl {
    me: Weak<BuilderImpl>,
    parts: Mutex<Vec<String>>,
}

impl BuilderImpl {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            parts: Mutex::new(Vec::new()),
        })
    }
}

impl Builder for BuilderImpl {
    fn with_part(&self, part: String) -> AopResult<Arc<dyn Builder>> {
        self.parts.lock().push(part);
        let me = self
            .me
            .upgrade()
            .ok_or_else(|| AopError::config("builder already dropped"))?;
        Ok(me as Arc<dyn Builder>)
    }

    fn parts(&self) -> AopResult<Vec<String>> {
        Ok(self.parts.lock().clone())
    }
}

impl_target!(BuilderImpl: dyn Builder);

/// 类自身的方法：目标不实现任何接口，只能使用子类代理
#[proxied(class_methods)]
pub trait CounterMethods {
    fn increment(&self) -> AopResult<u64>;

    #[sealed]
    fn current(&self) -> AopResult<u64>;
}

#[derive(Default)]
pub struct Counter {
    value: AtomicUsize,
}

impl CounterMethods for Counter {
    fn increment(&self) -> AopResult<u64> {
        Ok(self.value.fetch_add(1, Ordering::SeqCst) as u64 + 1)
    }

    fn current(&self) -> AopResult<u64> {
        Ok(self.value.load(Ordering::SeqCst) as u64)
    }
}

impl_target!(Counter: dyn CounterMethods);

#[proxied]
pub trait Lockable {
    fn lock(&self) -> AopResult<()>;

    fn is_locked(&self) -> AopResult<bool>;
}

/// 引入到代理上的混入对象
#[derive(Default)]
pub struct LockMixin {
    locked: AtomicBool,
}

impl Lockable for LockMixin {
    fn lock(&self) -> AopResult<()> {
        self.locked.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_locked(&self) -> AopResult<bool> {
        Ok(self.locked.load(Ordering::SeqCst))
    }
}

impl_target!(LockMixin: dyn Lockable);

/// 记录通知执行顺序
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// 每次调用记录方法名的前置通知
pub fn recording_before(journal: &Journal) -> Advice {
    let journal = journal.clone();
    Advice::before(move |method, _| {
        journal.record(format!("before {}", method.name()));
        Ok(())
    })
}

/// 接口代理的计算器
pub fn calculator_proxy(target: Arc<CalculatorImpl>, advice: Vec<Advice>) -> Arc<dyn Calculator> {
    let mut factory = ProxyFactory::from_target(target);
    for advice in advice {
        factory = factory.with_advice(advice).unwrap();
    }
    factory.get_proxy_as::<dyn Calculator>().unwrap()
}
