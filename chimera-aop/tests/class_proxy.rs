mod common;

use chimera_aop::prelude::*;
use chimera_aop::{markers, ClassProxy, ProxyInterface};
use common::*;

fn counting_proxy(journal: &Journal, frozen: bool) -> (Arc<dyn AopProxy>, Arc<Counter>) {
    let target = Arc::new(Counter::default());
    let proxy = ProxyFactory::from_target(target.clone())
        .with_advice(recording_before(journal))
        .unwrap()
        .frozen(frozen)
        .get_proxy()
        .unwrap();
    (proxy, target)
}

#[test]
fn test_target_without_interfaces_gets_class_proxy() {
    let journal = Journal::default();
    let (proxy, _) = counting_proxy(&journal, false);

    assert_eq!(proxy.strategy(), ProxyStrategy::Class);
    assert!(proxy.target_class().name().ends_with("$$ChimeraProxy"));
    assert!(proxy.exposes(&markers::ADVISED));
    assert!(!proxy.exposes(&markers::DECORATING_PROXY));

    let counter = <dyn CounterMethods as ProxyInterface>::from_proxy(proxy).unwrap();
    assert_eq!(counter.increment().unwrap(), 1);
    assert_eq!(counter.increment().unwrap(), 2);
    assert_eq!(journal.len(), 2);
}

#[test]
fn test_sealed_method_bypasses_advice() {
    let journal = Journal::default();
    let (proxy, target) = counting_proxy(&journal, false);
    let counter = <dyn CounterMethods as ProxyInterface>::from_proxy(proxy).unwrap();

    target.increment().unwrap();
    assert_eq!(counter.current().unwrap(), 1);
    assert_eq!(journal.len(), 0);
}

#[test]
fn test_frozen_static_configuration_fixes_slots() {
    let journal = Journal::default();
    let (proxy, _) = counting_proxy(&journal, true);
    let class_proxy = proxy.clone().into_any().downcast::<ClassProxy>().ok().unwrap();
    // increment 固化拦截链，current 不可覆盖
    assert_eq!(class_proxy.fixed_slot_count(), 1);

    let counter = <dyn CounterMethods as ProxyInterface>::from_proxy(proxy.clone()).unwrap();
    assert_eq!(counter.increment().unwrap(), 1);
    assert_eq!(journal.entries(), vec!["before increment"]);

    let advised = proxy.advised().unwrap();
    assert!(matches!(
        advised.add_advice(recording_before(&journal)),
        Err(AopError::Frozen { .. })
    ));
    counter.increment().unwrap();
    assert_eq!(journal.len(), 2);
}

#[test]
fn test_exposed_proxy_keeps_dynamic_slots() {
    let target = Arc::new(Counter::default());
    let proxy = ProxyFactory::from_target(target)
        .frozen(true)
        .expose_proxy(true)
        .get_proxy()
        .unwrap();
    let class_proxy = proxy.into_any().downcast::<ClassProxy>().ok().unwrap();
    assert_eq!(class_proxy.fixed_slot_count(), 0);
}

#[test]
fn test_proxy_target_class_overrides_interfaces() {
    let proxy = ProxyFactory::from_target(Arc::new(CalculatorImpl::default()))
        .proxy_target_class(true)
        .get_proxy()
        .unwrap();
    assert_eq!(proxy.strategy(), ProxyStrategy::Class);

    let calculator = <dyn Calculator as ProxyInterface>::from_proxy(proxy).unwrap();
    assert_eq!(calculator.add(20, 22).unwrap(), 42);
}

#[test]
fn test_final_class_cannot_be_proxied() {
    struct Sealed;

    impl CounterMethods for Sealed {
        fn increment(&self) -> AopResult<u64> {
            Ok(0)
        }

        fn current(&self) -> AopResult<u64> {
            Ok(0)
        }
    }

    impl_target!(Sealed => TargetClass::of::<Sealed>("Sealed").final_class(); dyn CounterMethods);

    let result = ProxyFactory::from_target(Arc::new(Sealed)).get_proxy();
    assert!(matches!(result, Err(AopError::ProxyGeneration { .. })));
}

#[test]
fn test_constructor_arguments_are_checked() {
    struct Configured;

    impl CounterMethods for Configured {
        fn increment(&self) -> AopResult<u64> {
            Ok(7)
        }

        fn current(&self) -> AopResult<u64> {
            Ok(7)
        }
    }

    impl_target!(
        Configured => TargetClass::of::<Configured>("Configured").constructor(Constructor::WithArgs(1));
        dyn CounterMethods
    );

    let missing = ProxyFactory::from_target(Arc::new(Configured)).get_proxy();
    assert!(matches!(missing, Err(AopError::ProxyGeneration { .. })));

    let proxy = ProxyFactory::from_target(Arc::new(Configured))
        .constructor_args(Arguments::new().with("seed".to_string()))
        .get_proxy_as::<dyn CounterMethods>()
        .unwrap();
    assert_eq!(proxy.increment().unwrap(), 7);
}

#[test]
fn test_from_target_registers_only_user_interfaces() {
    #[derive(Default)]
    struct Hybrid {
        counter: Counter,
        lock: LockMixin,
    }

    impl CounterMethods for Hybrid {
        fn increment(&self) -> AopResult<u64> {
            self.counter.increment()
        }

        fn current(&self) -> AopResult<u64> {
            self.counter.current()
        }
    }

    impl Lockable for Hybrid {
        fn lock(&self) -> AopResult<()> {
            self.lock.lock()
        }

        fn is_locked(&self) -> AopResult<bool> {
            self.lock.is_locked()
        }
    }

    impl_target!(Hybrid: dyn CounterMethods, dyn Lockable);

    let factory = ProxyFactory::from_target(Arc::new(Hybrid::default()));
    let lockable = <dyn Lockable as ProxyInterface>::interface();
    assert_eq!(factory.advised().interfaces(), vec![lockable]);

    let proxy = factory.proxy_target_class(true).get_proxy().unwrap();
    assert!(proxy.exposes(lockable));
    let counter = <dyn CounterMethods as ProxyInterface>::from_proxy(proxy).unwrap();
    assert_eq!(counter.increment().unwrap(), 1);
}
