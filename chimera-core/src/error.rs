/// 统一的错误处理类型
///
/// 框架外围（配置加载、日志初始化）统一使用 `anyhow::Result`，
/// 通过 `.context()` 补充上下文；需要调用方区分的失败使用 [`ApplicationError`]。
///
/// # 示例
///
/// ```rust,ignore
/// use anyhow::Context;
///
/// let source = TomlPropertySource::from_file("application.toml")
///     .context("Failed to load application config")?;
/// ```
pub use anyhow::Result;

use thiserror::Error;

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 日志系统初始化失败（通常是重复初始化）
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    /// 配置文件读取失败
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 配置内容解析失败
    #[error("Failed to parse config '{name}': {message}")]
    ConfigParse { name: String, message: String },

    /// 配置值无法绑定到目标类型
    #[error("Invalid value for config key '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// 应用层结果类型
pub type ApplicationResult<T> = std::result::Result<T, ApplicationError>;
