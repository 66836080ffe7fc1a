//! 目标源（TargetSource）
//!
//! 每次调用开始时获取目标，结束时释放。静态目标源每次返回同一个目标，
//! 代理在这种情况下跳过释放。

use crate::arguments::data_address;
use crate::dispatch::{Dispatch, TargetType};
use crate::error::{AopError, AopResult};
use crate::metadata::TargetClass;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

/// 目标源
pub trait TargetSource: Send + Sync {
    /// 目标的类，未知时返回 `None`
    fn target_class(&self) -> Option<Arc<TargetClass>>;

    /// 每次 `get_target` 是否返回同一个对象
    fn is_static(&self) -> bool;

    /// 获取目标，没有目标时返回 `None`
    fn get_target(&self) -> AopResult<Option<Arc<dyn Dispatch>>>;

    /// 释放 `get_target` 取得的目标
    fn release_target(&self, _target: Arc<dyn Dispatch>) -> AopResult<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;

    /// 是否与另一个目标源等价
    fn same_source(&self, other: &dyn TargetSource) -> bool {
        std::ptr::eq(
            self as *const Self as *const (),
            other as *const dyn TargetSource as *const (),
        )
    }

    fn describe(&self) -> String;
}

impl fmt::Debug for dyn TargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

type Factory = Arc<dyn Fn() -> AopResult<Arc<dyn Dispatch>> + Send + Sync>;

fn erase_factory<T, F>(factory: F) -> Factory
where
    T: Dispatch,
    F: Fn() -> AopResult<T> + Send + Sync + 'static,
{
    Arc::new(move || factory().map(|target| Arc::new(target) as Arc<dyn Dispatch>))
}

// ========== 单例 ==========

/// 固定目标
pub struct SingletonTargetSource {
    target: Arc<dyn Dispatch>,
}

impl SingletonTargetSource {
    pub fn new(target: Arc<dyn Dispatch>) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &Arc<dyn Dispatch> {
        &self.target
    }
}

impl TargetSource for SingletonTargetSource {
    fn target_class(&self) -> Option<Arc<TargetClass>> {
        Some(self.target.target_class())
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Dispatch>>> {
        Ok(Some(Arc::clone(&self.target)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn same_source(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<SingletonTargetSource>()
            .map_or(false, |o| data_address(&o.target) == data_address(&self.target))
    }

    fn describe(&self) -> String {
        format!("SingletonTargetSource for target object [{}]", self.target.target_class())
    }
}

// ========== 空目标 ==========

/// 没有目标的目标源，用于纯接口代理（所有方法都由拦截器实现）
#[derive(Debug, Clone, Default)]
pub struct EmptyTargetSource {
    target_class: Option<Arc<TargetClass>>,
}

impl EmptyTargetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_class(target_class: Arc<TargetClass>) -> Self {
        Self {
            target_class: Some(target_class),
        }
    }
}

impl TargetSource for EmptyTargetSource {
    fn target_class(&self) -> Option<Arc<TargetClass>> {
        self.target_class.clone()
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Dispatch>>> {
        Ok(None)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn same_source(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<EmptyTargetSource>()
            .map_or(false, |o| {
                o.target_class.as_ref().map(|c| c.name().to_string())
                    == self.target_class.as_ref().map(|c| c.name().to_string())
            })
    }

    fn describe(&self) -> String {
        match &self.target_class {
            Some(class) => format!("EmptyTargetSource: target class [{}]", class),
            None => "EmptyTargetSource: no target class".to_string(),
        }
    }
}

// ========== 热替换 ==========

/// 运行时可以替换目标的目标源
pub struct HotSwappableTargetSource {
    target: RwLock<Arc<dyn Dispatch>>,
}

impl HotSwappableTargetSource {
    pub fn new(target: Arc<dyn Dispatch>) -> Self {
        Self {
            target: RwLock::new(target),
        }
    }

    /// 替换目标，返回旧目标；之后开始的调用看到新目标
    pub fn swap(&self, new_target: Arc<dyn Dispatch>) -> Arc<dyn Dispatch> {
        let mut guard = self.target.write();
        let old = std::mem::replace(&mut *guard, new_target);
        tracing::debug!(
            "Hot-swapped target [{}] with [{}]",
            old.target_class(),
            guard.target_class()
        );
        old
    }
}

impl TargetSource for HotSwappableTargetSource {
    fn target_class(&self) -> Option<Arc<TargetClass>> {
        Some(self.target.read().target_class())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Dispatch>>> {
        Ok(Some(Arc::clone(&self.target.read())))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn describe(&self) -> String {
        format!("HotSwappableTargetSource for target [{}]", self.target.read().target_class())
    }
}

// ========== 原型 ==========

/// 每次调用创建一个新目标，调用结束后丢弃
pub struct PrototypeTargetSource {
    class: Arc<TargetClass>,
    factory: Factory,
    created: AtomicUsize,
    released: AtomicUsize,
}

impl PrototypeTargetSource {
    pub fn new<T, F>(factory: F) -> Self
    where
        T: TargetType,
        F: Fn() -> AopResult<T> + Send + Sync + 'static,
    {
        Self {
            class: T::class(),
            factory: erase_factory(factory),
            created: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }
}

impl TargetSource for PrototypeTargetSource {
    fn target_class(&self) -> Option<Arc<TargetClass>> {
        Some(Arc::clone(&self.class))
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Dispatch>>> {
        let target = (self.factory)()?;
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(Some(target))
    }

    fn release_target(&self, target: Arc<dyn Dispatch>) -> AopResult<()> {
        self.released.fetch_add(1, Ordering::Relaxed);
        drop(target);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn describe(&self) -> String {
        format!("PrototypeTargetSource for target class [{}]", self.class)
    }
}

// ========== 对象池 ==========

struct PoolState {
    idle: Vec<Arc<dyn Dispatch>>,
    active: usize,
}

/// 有界对象池
///
/// 池满时获取目标会阻塞，设置了 `max_wait` 时超时返回错误。
pub struct PooledTargetSource {
    class: Arc<TargetClass>,
    factory: Factory,
    max_size: usize,
    max_wait: Option<Duration>,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl PooledTargetSource {
    pub fn new<T, F>(max_size: usize, factory: F) -> Self
    where
        T: TargetType,
        F: Fn() -> AopResult<T> + Send + Sync + 'static,
    {
        Self {
            class: T::class(),
            factory: erase_factory(factory),
            max_size: max_size.max(1),
            max_wait: None,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                active: 0,
            }),
            available: Condvar::new(),
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }
}

impl TargetSource for PooledTargetSource {
    fn target_class(&self) -> Option<Arc<TargetClass>> {
        Some(Arc::clone(&self.class))
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Dispatch>>> {
        let deadline = self.max_wait.map(|wait| Instant::now() + wait);
        let mut state = self.state.lock();

        loop {
            if let Some(target) = state.idle.pop() {
                state.active += 1;
                return Ok(Some(target));
            }

            if state.active < self.max_size {
                // 先占位再在锁外创建
                state.active += 1;
                drop(state);
                return match (self.factory)() {
                    Ok(target) => Ok(Some(target)),
                    Err(e) => {
                        self.state.lock().active -= 1;
                        self.available.notify_one();
                        Err(e)
                    }
                };
            }

            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut state, deadline).timed_out()
                        && state.idle.is_empty()
                        && state.active >= self.max_size
                    {
                        return Err(AopError::TargetSource(format!(
                            "Pool for [{}] exhausted: {} active object(s), waited {:?}",
                            self.class,
                            state.active,
                            self.max_wait.unwrap_or_default()
                        )));
                    }
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    fn release_target(&self, target: Arc<dyn Dispatch>) -> AopResult<()> {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        state.idle.push(target);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn describe(&self) -> String {
        format!(
            "PooledTargetSource for target class [{}] (max size {})",
            self.class, self.max_size
        )
    }
}

// ========== 线程局部 ==========

type ThreadTargets = DashMap<ThreadId, Arc<dyn Dispatch>>;

/// 线程退出时从目标源移除该线程的目标
struct ThreadExitGuard {
    targets: Weak<ThreadTargets>,
    thread: ThreadId,
}

impl Drop for ThreadExitGuard {
    fn drop(&mut self) {
        if let Some(targets) = self.targets.upgrade() {
            targets.remove(&self.thread);
        }
    }
}

thread_local! {
    static EXIT_GUARDS: RefCell<Vec<ThreadExitGuard>> = const { RefCell::new(Vec::new()) };
}

fn remove_on_thread_exit(targets: &Arc<ThreadTargets>, thread: ThreadId) {
    let targets = Arc::downgrade(targets);
    let registered = EXIT_GUARDS.try_with(|guards| {
        let mut guards = guards.borrow_mut();
        guards.retain(|guard| guard.targets.strong_count() > 0);
        if !guards.iter().any(|guard| guard.targets.ptr_eq(&targets)) {
            guards.push(ThreadExitGuard { targets, thread });
        }
    });
    if registered.is_err() {
        tracing::debug!("Thread {:?} is exiting, its target is not tracked for cleanup", thread);
    }
}

/// 每个线程一个目标
///
/// 线程退出时它的目标随之移除；目标源先于线程释放时，线程不再持有任何目标。
pub struct ThreadLocalTargetSource {
    class: Arc<TargetClass>,
    factory: Factory,
    targets: Arc<ThreadTargets>,
    invocations: AtomicUsize,
    hits: AtomicUsize,
}

impl ThreadLocalTargetSource {
    pub fn new<T, F>(factory: F) -> Self
    where
        T: TargetType,
        F: Fn() -> AopResult<T> + Send + Sync + 'static,
    {
        Self {
            class: T::class(),
            factory: erase_factory(factory),
            targets: Arc::new(DashMap::new()),
            invocations: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
        }
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }

    /// 命中已有线程目标的次数
    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// 仍存活的线程持有的目标数
    pub fn object_count(&self) -> usize {
        self.targets.len()
    }

    /// 丢弃所有线程的目标
    pub fn destroy(&self) {
        tracing::debug!(
            "Destroying {} thread-bound target(s) of [{}]",
            self.targets.len(),
            self.class
        );
        self.targets.clear();
    }
}

impl TargetSource for ThreadLocalTargetSource {
    fn target_class(&self) -> Option<Arc<TargetClass>> {
        Some(Arc::clone(&self.class))
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Dispatch>>> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let thread = std::thread::current().id();

        if let Some(target) = self.targets.get(&thread) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(Arc::clone(target.value())));
        }

        let target = (self.factory)()?;
        tracing::debug!("Creating thread-bound target of [{}] for {:?}", self.class, thread);
        self.targets.insert(thread, Arc::clone(&target));
        remove_on_thread_exit(&self.targets, thread);
        Ok(Some(target))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn describe(&self) -> String {
        format!("ThreadLocalTargetSource for target class [{}]", self.class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::{Arguments, Value};
    use crate::metadata::Method;
    use std::sync::atomic::AtomicU64;

    static NEXT_ID: AtomicU64 = AtomicU64::new(0);

    struct Worker {
        id: u64,
    }

    impl Worker {
        fn new() -> AopResult<Self> {
            Ok(Self {
                id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            })
        }
    }

    impl Dispatch for Worker {
        fn target_class(&self) -> Arc<TargetClass> {
            Worker::class()
        }

        fn dispatch(&self, _method: &'static Method, _args: &Arguments) -> AopResult<Option<Value>> {
            Ok(Some(Box::new(self.id)))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl TargetType for Worker {
        fn class() -> Arc<TargetClass> {
            Arc::new(TargetClass::of::<Worker>("Worker"))
        }
    }

    fn id_of(target: &Arc<dyn Dispatch>) -> u64 {
        target.as_any().downcast_ref::<Worker>().unwrap().id
    }

    #[test]
    fn test_singleton_same_source() {
        let target: Arc<dyn Dispatch> = Arc::new(Worker::new().unwrap());
        let a = SingletonTargetSource::new(target.clone());
        let b = SingletonTargetSource::new(target);
        let c = SingletonTargetSource::new(Arc::new(Worker::new().unwrap()));

        assert!(a.is_static());
        assert!(a.same_source(&b));
        assert!(!a.same_source(&c));
        assert!(!a.same_source(&EmptyTargetSource::new()));
    }

    #[test]
    fn test_hot_swap_returns_old_target() {
        let first: Arc<dyn Dispatch> = Arc::new(Worker::new().unwrap());
        let source = HotSwappableTargetSource::new(first.clone());
        let old = source.swap(Arc::new(Worker::new().unwrap()));

        assert_eq!(id_of(&old), id_of(&first));
        let current = source.get_target().unwrap().unwrap();
        assert_ne!(id_of(&current), id_of(&first));
    }

    #[test]
    fn test_prototype_creates_per_call() {
        let source = PrototypeTargetSource::new(Worker::new);
        let a = source.get_target().unwrap().unwrap();
        let b = source.get_target().unwrap().unwrap();
        assert_ne!(id_of(&a), id_of(&b));
        source.release_target(a).unwrap();
        assert_eq!(source.created_count(), 2);
        assert_eq!(source.released_count(), 1);
    }

    #[test]
    fn test_pool_reuses_released_targets() {
        let pool = PooledTargetSource::new(2, Worker::new);
        let a = pool.get_target().unwrap().unwrap();
        let a_id = id_of(&a);
        assert_eq!(pool.active_count(), 1);

        pool.release_target(a).unwrap();
        assert_eq!((pool.active_count(), pool.idle_count()), (0, 1));

        let again = pool.get_target().unwrap().unwrap();
        assert_eq!(id_of(&again), a_id);
    }

    #[test]
    fn test_pool_exhaustion_times_out() {
        let pool = PooledTargetSource::new(1, Worker::new).with_max_wait(Duration::from_millis(20));
        let _held = pool.get_target().unwrap().unwrap();
        let err = pool.get_target().err().unwrap();
        assert!(matches!(err, AopError::TargetSource(_)));
    }

    #[test]
    fn test_pool_blocks_until_release() {
        let pool = Arc::new(PooledTargetSource::new(1, Worker::new));
        let held = pool.get_target().unwrap().unwrap();
        let held_id = id_of(&held);

        let waiter = {
            let pool = pool.clone();
            std::thread::spawn(move || id_of(&pool.get_target().unwrap().unwrap()))
        };
        std::thread::sleep(Duration::from_millis(20));
        pool.release_target(held).unwrap();

        assert_eq!(waiter.join().unwrap(), held_id);
    }

    #[test]
    fn test_thread_local_binds_per_thread() {
        let source = Arc::new(ThreadLocalTargetSource::new(Worker::new));
        let here = id_of(&source.get_target().unwrap().unwrap());
        assert_eq!(id_of(&source.get_target().unwrap().unwrap()), here);

        let there = {
            let source = source.clone();
            std::thread::spawn(move || id_of(&source.get_target().unwrap().unwrap()))
                .join()
                .unwrap()
        };

        assert_ne!(here, there);
        // 退出的线程已带走自己的目标
        assert_eq!(source.object_count(), 1);
        assert_eq!(source.invocation_count(), 3);
        assert_eq!(source.hit_count(), 1);

        source.destroy();
        assert_eq!(source.object_count(), 0);
    }

    #[test]
    fn test_thread_local_survives_destroy_and_drop() {
        let source = Arc::new(ThreadLocalTargetSource::new(Worker::new));
        let first = id_of(&source.get_target().unwrap().unwrap());
        source.destroy();

        let second = source.get_target().unwrap().unwrap();
        assert_ne!(id_of(&second), first);
        assert_eq!(source.object_count(), 1);

        let weak = Arc::downgrade(&second);
        drop(second);
        drop(source);
        assert!(weak.upgrade().is_none());
    }
}
