// chimera-core: Chimera 框架的公共基础设施
//
// 提供：
// - 分层配置环境（TOML / 环境变量 / 内存配置源）
// - 基于 tracing 的日志初始化
// - 统一的应用层错误类型

pub mod config;
pub mod error;
pub mod logging;

// 重新导出常用类型
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use error::{ApplicationError, ApplicationResult, Result};
pub use logging::{LogFormat, LogLevel, LoggingConfig};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::config::{
        self, ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource,
        PropertySource, TomlPropertySource,
    };
    pub use crate::error::{ApplicationError, ApplicationResult, Result};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use anyhow::{anyhow, Context};
}
