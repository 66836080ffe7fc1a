//! 配置环境
//!
//! 多个 [`PropertySource`] 按优先级叠加，高优先级覆盖低优先级。
//! 键统一使用点分形式，例如 `aop.proxy.expose-proxy`。

use crate::error::{ApplicationError, ApplicationResult};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// 配置值类型
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Object(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 字符串形式的 `true/yes/on/1` 与 `false/no/off/0` 也被接受
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// 转换为 TOML 值，供 serde 绑定使用
    ///
    /// 环境变量只能提供字符串，这里尽量还原成布尔或数字。
    fn to_toml(&self) -> toml::Value {
        match self {
            ConfigValue::String(s) => {
                if let Some(b) = self.as_bool().filter(|_| !s.trim().chars().all(|c| c.is_ascii_digit())) {
                    toml::Value::Boolean(b)
                } else if let Ok(i) = s.trim().parse::<i64>() {
                    toml::Value::Integer(i)
                } else {
                    toml::Value::String(s.clone())
                }
            }
            ConfigValue::Int(i) => toml::Value::Integer(*i),
            ConfigValue::Float(f) => toml::Value::Float(*f),
            ConfigValue::Bool(b) => toml::Value::Boolean(*b),
            ConfigValue::Array(items) => {
                toml::Value::Array(items.iter().map(ConfigValue::to_toml).collect())
            }
            ConfigValue::Object(map) => toml::Value::Table(
                map.iter().map(|(k, v)| (k.clone(), v.to_toml())).collect(),
            ),
        }
    }

    fn from_toml(value: &toml::Value) -> Self {
        match value {
            toml::Value::String(s) => ConfigValue::String(s.clone()),
            toml::Value::Integer(i) => ConfigValue::Int(*i),
            toml::Value::Float(f) => ConfigValue::Float(*f),
            toml::Value::Boolean(b) => ConfigValue::Bool(*b),
            toml::Value::Array(items) => {
                ConfigValue::Array(items.iter().map(ConfigValue::from_toml).collect())
            }
            toml::Value::Table(table) => ConfigValue::Object(
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), ConfigValue::from_toml(v)))
                    .collect(),
            ),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
        }
    }
}

/// 配置源 trait
pub trait PropertySource: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Option<ConfigValue>;

    fn keys(&self) -> Vec<String>;

    /// 数字越大优先级越高
    fn priority(&self) -> i32 {
        0
    }
}

/// 配置环境
pub struct Environment {
    sources: RwLock<Vec<Box<dyn PropertySource>>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources = self.sources.read();
        f.debug_struct("Environment")
            .field(
                "sources",
                &sources.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
        }
    }

    /// 添加配置源，插入后按优先级降序排列
    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        let mut sources = self.sources.write();
        tracing::debug!(
            "Adding property source '{}' (priority {})",
            source.name(),
            source.priority()
        );
        sources.push(source);
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub fn with_property_source(self, source: Box<dyn PropertySource>) -> Self {
        self.add_property_source(source);
        self
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let sources = self.sources.read();
        let found = sources
            .iter()
            .find_map(|source| source.get(key).map(|v| (source.name().to_string(), v)));
        match found {
            Some((source, value)) => {
                tracing::trace!("Config '{}' resolved from '{}'", key, source);
                Some(value)
            }
            None => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(String::from))
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get_i64(key).unwrap_or(default)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// 所有配置源中以 `prefix.` 开头的键（去重，去掉前缀）
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let dotted = format!("{}.", prefix);
        let sources = self.sources.read();
        let mut keys: Vec<String> = sources
            .iter()
            .flat_map(|s| s.keys())
            .filter_map(|k| k.strip_prefix(&dotted).map(String::from))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// 将 `prefix` 下的配置绑定到一个可反序列化的结构体
    ///
    /// 每个键都按优先级重新解析，因此高优先级配置源中的单个键
    /// 可以覆盖低优先级配置源中的同名键。
    pub fn bind<T: DeserializeOwned>(&self, prefix: &str) -> ApplicationResult<T> {
        let mut root = toml::value::Table::new();
        for key in self.keys_with_prefix(prefix) {
            let full_key = format!("{}.{}", prefix, key);
            if let Some(value) = self.get(&full_key) {
                insert_nested(&mut root, &key, value.to_toml());
            }
        }
        toml::Value::Table(root)
            .try_into::<T>()
            .map_err(|e| ApplicationError::InvalidValue {
                key: prefix.to_string(),
                message: e.to_string(),
            })
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_nested(table: &mut toml::value::Table, key: &str, value: toml::Value) {
    match key.split_once('.') {
        None => {
            table.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = table
                .entry(head.to_string())
                .or_insert_with(|| toml::Value::Table(toml::value::Table::new()));
            if !entry.is_table() {
                *entry = toml::Value::Table(toml::value::Table::new());
            }
            if let toml::Value::Table(child) = entry {
                insert_nested(child, rest, value);
            }
        }
    }
}

// ========== Property Sources ==========

/// 环境变量配置源
///
/// `APP_AOP_PROXY_EXPOSE_PROXY` 对应键 `aop.proxy.expose.proxy`，
/// 同时也会匹配 `aop.proxy.expose-proxy`（`-` 与 `.` 都映射为 `_`）。
pub struct EnvironmentPropertySource {
    prefix: String,
    priority: i32,
}

impl EnvironmentPropertySource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            priority: 100,
        }
    }

    fn key_to_env(&self, key: &str) -> String {
        format!(
            "{}{}",
            self.prefix,
            key.replace(['.', '-'], "_").to_uppercase()
        )
    }

    fn env_to_key(&self, env_key: &str) -> String {
        env_key
            .strip_prefix(&self.prefix)
            .unwrap_or(env_key)
            .to_lowercase()
            .replace('_', ".")
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.key_to_env(key))
            .ok()
            .map(ConfigValue::String)
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars()
            .filter(|(k, _)| k.starts_with(&self.prefix))
            .map(|(k, _)| self.env_to_key(&k))
            .collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// TOML 配置源，嵌套表被展平为点分键
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl TomlPropertySource {
    pub fn from_file(path: impl AsRef<Path>) -> ApplicationResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ApplicationError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, path.display().to_string())
    }

    pub fn parse(content: &str, name: impl Into<String>) -> ApplicationResult<Self> {
        let name = name.into();
        let value: toml::Value =
            toml::from_str(content).map_err(|e| ApplicationError::ConfigParse {
                name: name.clone(),
                message: e.to_string(),
            })?;

        let mut flat = BTreeMap::new();
        flatten(&value, String::new(), &mut flat);

        Ok(Self {
            name,
            properties: flat.into_iter().collect(),
            priority: 0,
        })
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

fn flatten(value: &toml::Value, prefix: String, out: &mut BTreeMap<String, ConfigValue>) {
    match value {
        toml::Value::Table(table) => {
            for (key, child) in table {
                let next = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(child, next, out);
            }
        }
        other => {
            out.insert(prefix, ConfigValue::from_toml(other));
        }
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置源（用于测试或运行时覆盖）
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            priority: 50,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_toml_source_flattens_tables() {
        let source = TomlPropertySource::parse(
            r#"
            [aop.proxy]
            expose-proxy = true
            [server]
            port = 8080
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(source.get("aop.proxy.expose-proxy"), Some(ConfigValue::Bool(true)));
        assert_eq!(source.get("server.port"), Some(ConfigValue::Int(8080)));
    }

    #[test]
    fn test_priority_order() {
        let env = Environment::new()
            .with_property_source(Box::new(
                MapPropertySource::new("low")
                    .with_priority(1)
                    .with_property("app.name", ConfigValue::String("low".into())),
            ))
            .with_property_source(Box::new(
                MapPropertySource::new("high")
                    .with_priority(10)
                    .with_property("app.name", ConfigValue::String("high".into())),
            ));

        assert_eq!(env.get_string("app.name").as_deref(), Some("high"));
        assert_eq!(env.get_string_or("app.missing", "fallback"), "fallback");
    }

    #[test]
    fn test_bool_coercion_from_strings() {
        assert_eq!(ConfigValue::String("yes".into()).as_bool(), Some(true));
        assert_eq!(ConfigValue::String("OFF".into()).as_bool(), Some(false));
        assert_eq!(ConfigValue::String("maybe".into()).as_bool(), None);
    }

    #[derive(Debug, Deserialize, Default, PartialEq)]
    #[serde(default, rename_all = "kebab-case")]
    struct Flags {
        expose_proxy: bool,
        frozen: bool,
        pool_size: i64,
    }

    #[test]
    fn test_bind_merges_sources() {
        let env = Environment::new()
            .with_property_source(Box::new(
                TomlPropertySource::parse("[aop.proxy]\nexpose-proxy = true\npool-size = 4\n", "file")
                    .unwrap(),
            ))
            .with_property_source(Box::new(
                MapPropertySource::new("override")
                    .with_property("aop.proxy.frozen", ConfigValue::String("true".into()))
                    .with_property("aop.proxy.pool-size", ConfigValue::String("8".into())),
            ));

        let flags: Flags = env.bind("aop.proxy").unwrap();
        assert_eq!(
            flags,
            Flags {
                expose_proxy: true,
                frozen: true,
                pool_size: 8,
            }
        );
    }

    #[test]
    fn test_bind_empty_prefix_uses_defaults() {
        let env = Environment::new();
        let flags: Flags = env.bind("aop.proxy").unwrap();
        assert_eq!(flags, Flags::default());
    }
}
