use chimera_aop::prelude::*;
use chimera_aop_macros::proxied;
use chimera_core::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

// ==================== 业务接口 ====================

#[proxied]
pub trait OrderService {
    fn place(&self, item: String, quantity: u32) -> AopResult<u64>;

    /// 批量下单，内部经由当前代理调用 `place`
    fn place_all(&self, items: Vec<String>) -> AopResult<Vec<u64>>;

    #[throws(kinds::IO)]
    fn export(&self, path: String) -> AopResult<String>;
}

#[derive(Default)]
struct OrderServiceImpl {
    next_id: AtomicU64,
}

impl OrderService for OrderServiceImpl {
    fn place(&self, item: String, quantity: u32) -> AopResult<u64> {
        if quantity == 0 {
            return Err(Fault::new(&kinds::ILLEGAL_ARGUMENT, format!("quantity of {} must be positive", item)).into());
        }
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn place_all(&self, items: Vec<String>) -> AopResult<Vec<u64>> {
        let me = ProxyContext::current::<dyn OrderService>()?;
        items.into_iter().map(|item| me.place(item, 1)).collect()
    }

    fn export(&self, path: String) -> AopResult<String> {
        if path.starts_with("/readonly") {
            return Err(Fault::new(&kinds::IO, format!("{} is read-only", path)).into());
        }
        Ok(format!("exported to {}", path))
    }
}

impl_target!(OrderServiceImpl: dyn OrderService);

// ==================== 场景 ====================

/// 场景 A：前置通知在目标之前执行一次
fn before_advice() -> anyhow::Result<()> {
    println!("\n📌 Scenario A: before advice");

    let orders = ProxyFactory::from_target(Arc::new(OrderServiceImpl::default()))
        .with_advice(Advice::before(|method, args| {
            println!("   → before {} with {} argument(s)", method.name(), args.len());
            Ok(())
        }))?
        .get_proxy_as::<dyn OrderService>()?;

    let id = orders.place("book".to_string(), 2)?;
    println!("   ✅ order #{} placed", id);
    Ok(())
}

/// 场景 B：异常通知观察故障，故障照常传播给调用方
fn throws_advice() -> anyhow::Result<()> {
    println!("\n📌 Scenario B: throws advice");

    let handler = ThrowsAdvice::new("audit").on(&kinds::EXCEPTION, |method, _, error| {
        println!("   ⚠️  {} failed: {}", method.name(), error);
    });
    let orders = ProxyFactory::from_target(Arc::new(OrderServiceImpl::default()))
        .with_advice(Advice::throws(handler))?
        .get_proxy_as::<dyn OrderService>()?;

    match orders.export("/readonly/orders.csv".to_string()) {
        Ok(path) => println!("   unexpected success: {}", path),
        Err(e) => println!("   ✅ caller still sees: {}", e),
    }
    Ok(())
}

/// 场景 C：暴露代理后，目标内部的自调用也经过拦截链
fn self_invocation(config: &ProxyConfig) -> anyhow::Result<()> {
    println!("\n📌 Scenario C: self-invocation through the exposed proxy");

    let debug = Arc::new(DebugInterceptor::new());
    let orders = ProxyFactory::from_target(Arc::new(OrderServiceImpl::default()))
        .with_config(config)
        .with_advice(Advice::Interceptor(debug.clone()))?
        .get_proxy_as::<dyn OrderService>()?;

    let ids = orders.place_all(vec!["pen".to_string(), "ink".to_string()])?;
    println!("   ✅ placed {:?}, {} intercepted call(s)", ids, debug.count());
    println!("   proxy exposed after the call: {}", ProxyContext::is_exposed());
    Ok(())
}

/// 场景 D：冻结前的修改对已有代理生效，冻结后拒绝修改
fn freeze() -> anyhow::Result<()> {
    println!("\n📌 Scenario D: frozen configuration");

    let factory = ProxyFactory::from_target(Arc::new(OrderServiceImpl::default()));
    let orders = factory.get_proxy_as::<dyn OrderService>()?;
    let advised = Arc::clone(factory.advised());

    advised.add_advice(Advice::before(|method, _| {
        println!("   → late advice on {}", method.name());
        Ok(())
    }))?;
    orders.place("lamp".to_string(), 1)?;

    advised.set_frozen(true);
    match advised.add_advice(Advice::interceptor(TraceInterceptor::new())) {
        Ok(()) => println!("   unexpected: frozen configuration accepted new advice"),
        Err(e) => println!("   ✅ rejected: {}", e),
    }
    println!("   advisor count: {}", advised.advisor_count());
    Ok(())
}

/// 多个阻塞任务并发调用同一个代理
async fn concurrent_calls() -> anyhow::Result<()> {
    println!("\n📌 Concurrent invocations");

    let orders = ProxyFactory::from_target(Arc::new(OrderServiceImpl::default()))
        .with_advice(Advice::interceptor(PerformanceMonitorInterceptor::new(
            std::time::Duration::from_millis(5),
        )))?
        .get_proxy_as::<dyn OrderService>()?;

    let mut handles = Vec::new();
    for worker in 0..4 {
        let orders = Arc::clone(&orders);
        handles.push(tokio::task::spawn_blocking(move || {
            (0..10).try_for_each(|i| orders.place(format!("item-{}-{}", worker, i), 1).map(|_| ()))
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let last = orders.place("receipt".to_string(), 1)?;
    println!("   ✅ 41 orders placed, last id #{}", last);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = Environment::new()
        .with_property_source(Box::new(EnvironmentPropertySource::new("APP")))
        .with_property_source(Box::new(
            MapPropertySource::new("demo")
                .with_property("aop.proxy.expose-proxy", ConfigValue::Bool(true))
                .with_property("logging.level", ConfigValue::String("info".to_string())),
        ));

    LoggingConfig::from_environment(&env)
        .context("Invalid logging configuration")?
        .init()?;
    let config = ProxyConfig::from_environment(&env)?;
    tracing::info!("Proxy configuration: {:?}", config);

    println!("╔════════════════════════════════════════════════════╗");
    println!("║  Chimera AOP proxy demo                            ║");
    println!("╚════════════════════════════════════════════════════╝");

    before_advice()?;
    throws_advice()?;
    self_invocation(&config)?;
    freeze()?;
    concurrent_calls().await?;

    println!("\n👋 Done");
    Ok(())
}
