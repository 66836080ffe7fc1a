//! 日志初始化
//!
//! 框架内部统一通过 `tracing` 记录事件，这里负责安装订阅者。
//! 配置可以来自代码构建、环境变量或 [`Environment`] 中的 `logging.*` 键。

use crate::config::Environment;
use crate::error::{ApplicationError, ApplicationResult};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = ApplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ApplicationError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!("unknown log level '{}'", s),
            }),
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 紧凑格式（默认）
    Compact,
    /// 完整格式
    Full,
    /// JSON 格式
    Json,
    /// 美化格式（适合开发）
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ApplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(ApplicationError::InvalidValue {
                key: "logging.format".to_string(),
                message: format!("unknown log format '{}'", s),
            }),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogFormat::Compact => "compact",
            LogFormat::Full => "full",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        };
        f.write_str(s)
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 日志级别（默认：Info）
    pub level: LogLevel,

    /// 日志格式（默认：Compact）
    pub format: LogFormat,

    /// 是否显示目标模块路径（默认：false）
    pub show_target: bool,

    /// 是否显示线程名（默认：false）
    ///
    /// 代理在多线程下被调用时，打开此项便于区分各线程的拦截链。
    pub show_thread_names: bool,

    /// 自定义过滤器，例如 `"chimera_aop=debug,warn"`
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            show_target: false,
            show_thread_names: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn show_thread_names(mut self, show: bool) -> Self {
        self.show_thread_names = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 从环境变量读取配置（`RUST_LOG` / `LOG_LEVEL` / `LOG_FORMAT`）
    ///
    /// 无法识别的值被忽略，保留默认值。
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            config.filter = Some(rust_log);
        }
        if let Some(level) = std::env::var("LOG_LEVEL").ok().and_then(|s| s.parse().ok()) {
            config.level = level;
        }
        if let Some(format) = std::env::var("LOG_FORMAT").ok().and_then(|s| s.parse().ok()) {
            config.format = format;
        }

        config
    }

    /// 从配置环境读取 `logging.*`
    ///
    /// 与 [`from_env`](Self::from_env) 不同，这里遇到非法值直接报错。
    pub fn from_environment(env: &Environment) -> ApplicationResult<Self> {
        let mut config = Self::default();

        if let Some(level) = env.get_string("logging.level") {
            config.level = level.parse()?;
        }
        if let Some(format) = env.get_string("logging.format") {
            config.format = format.parse()?;
        }
        config.filter = env.get_string("logging.filter");
        config.show_target = env.get_bool_or("logging.show-target", config.show_target);
        config.show_thread_names =
            env.get_bool_or("logging.show-thread-names", config.show_thread_names);

        Ok(config)
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string());
        match &self.filter {
            Some(filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }

    /// 安装全局订阅者
    ///
    /// 每个进程只能成功一次，重复调用返回 [`ApplicationError::LoggingInitFailed`]。
    pub fn init(self) -> ApplicationResult<()> {
        let env_filter = self.env_filter();
        let builder = fmt()
            .with_env_filter(env_filter)
            .with_target(self.show_target)
            .with_thread_names(self.show_thread_names);

        let result = match self.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Full => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };

        result.map_err(|e| ApplicationError::LoggingInitFailed(e.to_string()))
    }

    /// 与 [`init`](Self::init) 相同，但忽略“已初始化”错误
    ///
    /// 测试中多个用例可能并发调用。
    pub fn try_init(self) {
        if let Err(e) = self.init() {
            tracing::debug!("Logging already initialized: {}", e);
        }
    }
}
