//! 通知适配器
//!
//! 每个适配器识别一种通知形态，并生成围绕 `proceed()` 执行相应逻辑的拦截器。

use crate::advice::{
    Advice, AfterAdvice, AfterReturningAdvice, IntroductionInterceptor, MethodBeforeAdvice,
    MethodInterceptor, ThrowsAdvice,
};
use crate::advisor::Advisor;
use crate::arguments::Value;
use crate::error::{AopError, AopResult};
use crate::joinpoint::MethodInvocation;
use std::sync::Arc;

/// 通知适配器
pub trait AdvisorAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, advice: &Advice) -> bool;

    /// 为通知器生成拦截器，仅在 `supports` 为真时调用
    fn interceptor(&self, advisor: &dyn Advisor) -> AopResult<Arc<dyn MethodInterceptor>>;
}

fn unsupported(adapter: &str, advisor: &dyn Advisor) -> AopError {
    AopError::Config(format!(
        "{} cannot adapt advice [{}]",
        adapter,
        advisor.advice().describe()
    ))
}

// ========== 前置 ==========

pub struct BeforeAdviceAdapter;

impl AdvisorAdapter for BeforeAdviceAdapter {
    fn name(&self) -> &str {
        "BeforeAdviceAdapter"
    }

    fn supports(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Before(_))
    }

    fn interceptor(&self, advisor: &dyn Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::Before(advice) => Ok(Arc::new(MethodBeforeAdviceInterceptor {
                advice: advice.clone(),
            })),
            _ => Err(unsupported(self.name(), advisor)),
        }
    }
}

pub struct MethodBeforeAdviceInterceptor {
    advice: Arc<dyn MethodBeforeAdvice>,
}

impl MethodInterceptor for MethodBeforeAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
        self.advice
            .before(invocation.method(), invocation.arguments(), invocation.this())?;
        invocation.proceed()
    }

    fn describe(&self) -> String {
        format!("MethodBeforeAdviceInterceptor({})", self.advice.describe())
    }
}

// ========== 返回后 ==========

pub struct AfterReturningAdviceAdapter;

impl AdvisorAdapter for AfterReturningAdviceAdapter {
    fn name(&self) -> &str {
        "AfterReturningAdviceAdapter"
    }

    fn supports(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::AfterReturning(_))
    }

    fn interceptor(&self, advisor: &dyn Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::AfterReturning(advice) => Ok(Arc::new(AfterReturningAdviceInterceptor {
                advice: advice.clone(),
            })),
            _ => Err(unsupported(self.name(), advisor)),
        }
    }
}

pub struct AfterReturningAdviceInterceptor {
    advice: Arc<dyn AfterReturningAdvice>,
}

impl MethodInterceptor for AfterReturningAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
        let value = invocation.proceed()?;
        self.advice.after_returning(
            value.as_deref(),
            invocation.method(),
            invocation.arguments(),
            invocation.this(),
        )?;
        Ok(value)
    }

    fn describe(&self) -> String {
        format!("AfterReturningAdviceInterceptor({})", self.advice.describe())
    }
}

// ========== 后置（finally） ==========

pub struct AfterAdviceAdapter;

impl AdvisorAdapter for AfterAdviceAdapter {
    fn name(&self) -> &str {
        "AfterAdviceAdapter"
    }

    fn supports(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::After(_))
    }

    fn interceptor(&self, advisor: &dyn Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::After(advice) => Ok(Arc::new(AfterAdviceInterceptor {
                advice: advice.clone(),
            })),
            _ => Err(unsupported(self.name(), advisor)),
        }
    }
}

/// 无论目标成功还是失败都会执行后置通知
///
/// 调用已经失败时，后置通知自身的错误只记录日志，原错误继续传播。
pub struct AfterAdviceInterceptor {
    advice: Arc<dyn AfterAdvice>,
}

impl MethodInterceptor for AfterAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
        let result = invocation.proceed();
        let after = self
            .advice
            .after(invocation.method(), invocation.arguments(), invocation.this());

        match (result, after) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(after_error)) => {
                tracing::warn!(
                    "After advice for {} failed while the invocation had already failed: {}",
                    invocation.method(),
                    after_error
                );
                Err(e)
            }
        }
    }

    fn describe(&self) -> String {
        format!("AfterAdviceInterceptor({})", self.advice.describe())
    }
}

// ========== 异常 ==========

pub struct ThrowsAdviceAdapter;

impl AdvisorAdapter for ThrowsAdviceAdapter {
    fn name(&self) -> &str {
        "ThrowsAdviceAdapter"
    }

    fn supports(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Throws(_))
    }

    fn interceptor(&self, advisor: &dyn Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::Throws(advice) => Ok(Arc::new(ThrowsAdviceInterceptor::new(advice.clone())?)),
            _ => Err(unsupported(self.name(), advisor)),
        }
    }
}

/// 按故障类型分派异常通知
pub struct ThrowsAdviceInterceptor {
    advice: Arc<ThrowsAdvice>,
}

impl ThrowsAdviceInterceptor {
    /// 没有任何处理函数的异常通知是配置错误
    pub fn new(advice: Arc<ThrowsAdvice>) -> AopResult<Self> {
        if advice.handler_count() == 0 {
            return Err(AopError::Config(format!(
                "At least one handler must be registered on throws advice [{}]",
                advice.name()
            )));
        }
        Ok(Self { advice })
    }
}

impl MethodInterceptor for ThrowsAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
        match invocation.proceed() {
            Ok(value) => Ok(value),
            Err(error) => {
                if let Some(handler) = self.advice.handler_for(error.kind()) {
                    tracing::trace!(
                        "Throws advice '{}' handling {} from {}",
                        self.advice.name(),
                        error.kind(),
                        invocation.method()
                    );
                    handler(invocation.method(), invocation.arguments(), &error);
                }
                Err(error)
            }
        }
    }

    fn describe(&self) -> String {
        format!("ThrowsAdviceInterceptor({})", self.advice.name())
    }
}

// ========== 引入 ==========

/// 把引入拦截器当作普通拦截器放进链中
pub struct IntroductionInterceptorAdapter {
    interceptor: Arc<dyn IntroductionInterceptor>,
}

impl IntroductionInterceptorAdapter {
    pub fn new(interceptor: Arc<dyn IntroductionInterceptor>) -> Self {
        Self { interceptor }
    }
}

impl MethodInterceptor for IntroductionInterceptorAdapter {
    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<Option<Value>> {
        self.interceptor.invoke(invocation)
    }

    fn describe(&self) -> String {
        self.interceptor.describe()
    }
}
