mod common;

use chimera_aop::prelude::*;
use chimera_aop::{DelegatingIntroductionInterceptor, ProxyInterface};
use common::*;

fn lockable_advisor() -> Arc<dyn Advisor> {
    let mixin = DelegatingIntroductionInterceptor::new(Arc::new(LockMixin::default()));
    Arc::new(
        DefaultIntroductionAdvisor::new(Advice::introduction(mixin))
            .with_interface(<dyn Lockable as ProxyInterface>::interface()),
    )
}

#[test]
fn test_introduced_interface_is_delegated() {
    let journal = Journal::default();
    let target = Arc::new(CalculatorImpl::default());
    let proxy = ProxyFactory::from_target(target.clone())
        .with_advisor(lockable_advisor())
        .unwrap()
        .with_advice(recording_before(&journal))
        .unwrap()
        .get_proxy()
        .unwrap();

    let lockable = <dyn Lockable as ProxyInterface>::from_proxy(proxy.clone()).unwrap();
    let calculator = <dyn Calculator as ProxyInterface>::from_proxy(proxy).unwrap();

    assert!(!lockable.is_locked().unwrap());
    lockable.lock().unwrap();
    assert!(lockable.is_locked().unwrap());

    assert_eq!(calculator.add(1, 2).unwrap(), 3);
    assert_eq!(target.calls(), 1);
    // 引入拦截器直接回答，之后的通知不会执行
    assert_eq!(journal.entries(), vec!["before add"]);
}

#[test]
fn test_removing_introduction_withdraws_interface() {
    let factory = ProxyFactory::from_target(Arc::new(CalculatorImpl::default()))
        .with_advisor(lockable_advisor())
        .unwrap();
    let lockable = <dyn Lockable as ProxyInterface>::interface();
    assert!(factory.advised().is_interface_proxied(lockable));

    factory.advised().remove_advisor(0).unwrap();
    assert!(!factory.advised().is_interface_proxied(lockable));

    let proxy = factory.get_proxy().unwrap();
    assert!(<dyn Lockable as ProxyInterface>::from_proxy(proxy).is_err());
}

#[test]
fn test_introduction_requires_matching_advice() {
    let advisor = DefaultIntroductionAdvisor::new(Advice::interceptor(TraceInterceptor::new()))
        .with_interface(<dyn Lockable as ProxyInterface>::interface());
    let result = ProxyFactory::new().with_advisor(Arc::new(advisor));
    assert!(matches!(result, Err(AopError::Config(_))));

    let unrelated = DelegatingIntroductionInterceptor::new(Arc::new(CalculatorImpl::default()));
    let advisor = DefaultIntroductionAdvisor::new(Advice::introduction(unrelated))
        .with_interface(<dyn Lockable as ProxyInterface>::interface());
    let result = ProxyFactory::new().with_advisor(Arc::new(advisor));
    assert!(matches!(result, Err(AopError::Config(_))));
}
