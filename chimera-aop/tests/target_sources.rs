mod common;

use chimera_aop::prelude::*;
use common::*;
use std::time::Duration;

#[test]
fn test_hot_swap_redirects_calls() {
    let source = Arc::new(HotSwappableTargetSource::new(Arc::new(CalculatorImpl::default())));
    let proxy = ProxyFactory::new()
        .with_target_source(source.clone())
        .with_interface_of::<dyn Calculator>()
        .unwrap()
        .get_proxy_as::<dyn Calculator>()
        .unwrap();

    assert_eq!(proxy.add(1, 1).unwrap(), 2);
    let old = source.swap(Arc::new(CalculatorImpl::with_offset(100)));
    assert!(old.as_any().downcast_ref::<CalculatorImpl>().is_some());
    assert_eq!(proxy.add(1, 1).unwrap(), 102);
}

#[test]
fn test_pooled_targets_are_returned_after_each_call() {
    let source = Arc::new(PooledTargetSource::new(2, || Ok(CalculatorImpl::default())));
    let proxy = ProxyFactory::proxy_for_target_source::<dyn Calculator>(source.clone()).unwrap();

    assert_eq!(proxy.add(2, 2).unwrap(), 4);
    assert!(proxy.divide(1, 0).is_err());
    assert_eq!(source.active_count(), 0);
    assert_eq!(source.idle_count(), 1);

    std::thread::scope(|scope| {
        for t in 0..4 {
            let proxy = proxy.clone();
            scope.spawn(move || {
                for i in 0..20 {
                    assert_eq!(proxy.add(t, i).unwrap(), t + i);
                }
            });
        }
    });

    assert_eq!(source.active_count(), 0);
    assert!(source.idle_count() <= source.max_size());
}

#[test]
fn test_exhausted_pool_times_out() {
    let source = Arc::new(
        PooledTargetSource::new(1, || Ok(CalculatorImpl::default())).with_max_wait(Duration::from_millis(20)),
    );
    let held = source.get_target().unwrap().unwrap();
    assert_eq!(source.active_count(), 1);

    let proxy = ProxyFactory::proxy_for_target_source::<dyn Calculator>(source.clone()).unwrap();
    assert!(matches!(proxy.add(1, 1), Err(AopError::TargetSource(_))));

    source.release_target(held).unwrap();
    assert_eq!(proxy.add(1, 1).unwrap(), 2);
}

#[test]
fn test_thread_local_targets_per_thread() {
    let source = Arc::new(ThreadLocalTargetSource::new(|| Ok(CalculatorImpl::default())));
    let proxy = ProxyFactory::proxy_for_target_source::<dyn Calculator>(source.clone()).unwrap();

    proxy.add(1, 1).unwrap();
    proxy.add(1, 1).unwrap();
    std::thread::scope(|scope| {
        scope.spawn(|| {
            proxy.add(1, 1).unwrap();
            assert_eq!(source.object_count(), 2);
        });
    });

    assert_eq!(source.invocation_count(), 3);
    assert_eq!(source.hit_count(), 1);

    source.destroy();
    assert_eq!(source.object_count(), 0);
}

#[test]
fn test_thread_local_targets_leave_with_their_threads() {
    let source = Arc::new(ThreadLocalTargetSource::new(|| Ok(CalculatorImpl::default())));
    let proxy = ProxyFactory::proxy_for_target_source::<dyn Calculator>(source.clone()).unwrap();
    proxy.add(1, 1).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let proxy = proxy.clone();
            std::thread::spawn(move || proxy.add(2, 2).unwrap())
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), 4);
    }

    assert_eq!(source.invocation_count(), 5);
    assert_eq!(source.object_count(), 1);
}

/// 只实现 `add` 的拦截器，其余方法继续执行
struct TimesTen;

impl MethodInterceptor for TimesTen {
    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
        if invocation.method().name() != "add" {
            return invocation.proceed();
        }
        let a: i32 = invocation.arguments().take(0, invocation.method())?;
        Ok(Some(Box::new(a * 10)))
    }
}

#[test]
fn test_interceptor_only_proxy_without_target() {
    let proxy = ProxyFactory::proxy_for::<dyn Calculator>(TimesTen).unwrap();

    assert_eq!(proxy.add(4, 0).unwrap(), 40);
    assert!(matches!(proxy.label(), Err(AopError::MissingTarget { .. })));
}
