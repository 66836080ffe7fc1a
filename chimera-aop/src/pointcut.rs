//! 切点（Pointcut）
//!
//! 切点由类过滤器和方法匹配器组成。方法匹配器可以是静态的（只看方法和类，
//! 结果可缓存），也可以是动态的（每次调用都要用实际参数重新求值）。

use crate::arguments::Arguments;
use crate::error::{AopError, AopResult};
use crate::metadata::{Interface, Method, TargetClass};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// 类过滤器
pub trait ClassFilter: Send + Sync {
    fn matches(&self, class: &TargetClass) -> bool;

    /// 是否匹配所有类
    fn is_universal(&self) -> bool {
        false
    }
}

/// 方法匹配器
pub trait MethodMatcher: Send + Sync {
    /// 静态匹配
    fn matches(&self, method: &Method, class: &TargetClass) -> bool;

    /// 是否需要在每次调用时用实际参数再次匹配
    fn is_runtime(&self) -> bool {
        false
    }

    /// 动态匹配，仅在静态匹配通过且 `is_runtime()` 为真时调用
    fn matches_with_args(&self, method: &Method, class: &TargetClass, _args: &Arguments) -> bool {
        self.matches(method, class)
    }

    fn is_universal(&self) -> bool {
        false
    }
}

/// 切点
pub trait Pointcut: Send + Sync {
    fn class_filter(&self) -> Arc<dyn ClassFilter>;

    fn method_matcher(&self) -> Arc<dyn MethodMatcher>;

    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

// ========== 类过滤器 ==========

/// 匹配所有类
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueClassFilter;

impl ClassFilter for TrueClassFilter {
    fn matches(&self, _class: &TargetClass) -> bool {
        true
    }

    fn is_universal(&self) -> bool {
        true
    }
}

/// 按类名匹配（支持 `*` 通配符）
#[derive(Debug, Clone)]
pub struct TypeNameClassFilter {
    pattern: String,
}

impl TypeNameClassFilter {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl ClassFilter for TypeNameClassFilter {
    fn matches(&self, class: &TargetClass) -> bool {
        pattern_matches(&self.pattern, class.name())
    }
}

/// 匹配实现了指定接口的类
#[derive(Debug, Clone, Copy)]
pub struct InterfaceClassFilter {
    interface: &'static Interface,
}

impl InterfaceClassFilter {
    pub fn new(interface: &'static Interface) -> Self {
        Self { interface }
    }
}

impl ClassFilter for InterfaceClassFilter {
    fn matches(&self, class: &TargetClass) -> bool {
        class.is_assignable_to(self.interface)
    }
}

// ========== 方法匹配器 ==========

/// 匹配所有方法
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueMethodMatcher;

impl MethodMatcher for TrueMethodMatcher {
    fn matches(&self, _method: &Method, _class: &TargetClass) -> bool {
        true
    }

    fn is_universal(&self) -> bool {
        true
    }
}

type ArgsPredicate = dyn Fn(&Method, &Arguments) -> bool + Send + Sync;
type StaticPredicate = dyn Fn(&Method, &TargetClass) -> bool + Send + Sync;

/// 动态方法匹配器
///
/// 静态部分默认匹配所有方法，可以用 [`with_static`](Self::with_static) 收窄。
pub struct DynamicMethodMatcher {
    static_part: Option<Box<StaticPredicate>>,
    runtime_part: Box<ArgsPredicate>,
}

impl DynamicMethodMatcher {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Method, &Arguments) -> bool + Send + Sync + 'static,
    {
        Self {
            static_part: None,
            runtime_part: Box::new(predicate),
        }
    }

    pub fn with_static<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Method, &TargetClass) -> bool + Send + Sync + 'static,
    {
        self.static_part = Some(Box::new(predicate));
        self
    }
}

impl MethodMatcher for DynamicMethodMatcher {
    fn matches(&self, method: &Method, class: &TargetClass) -> bool {
        self.static_part.as_ref().map_or(true, |p| p(method, class))
    }

    fn is_runtime(&self) -> bool {
        true
    }

    fn matches_with_args(&self, method: &Method, _class: &TargetClass, args: &Arguments) -> bool {
        (self.runtime_part)(method, args)
    }
}

impl fmt::Debug for DynamicMethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicMethodMatcher")
            .field("has_static_part", &self.static_part.is_some())
            .finish()
    }
}

// ========== 切点实现 ==========

/// 匹配一切的切点
#[derive(Debug, Clone, Copy, Default)]
pub struct TruePointcut;

impl Pointcut for TruePointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::new(TrueClassFilter)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::new(TrueMethodMatcher)
    }

    fn describe(&self) -> String {
        "Pointcut.TRUE".to_string()
    }
}

/// 按方法名匹配
///
/// 支持的模式：
/// - `*` - 匹配任意方法
/// - `get*` - 以 get 开头
/// - `*User` - 以 User 结尾
/// - `*User*` - 包含 User
#[derive(Debug, Clone, Default)]
pub struct NameMatchMethodPointcut {
    names: Vec<String>,
}

impl NameMatchMethodPointcut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
        self
    }
}

impl MethodMatcher for NameMatchMethodPointcut {
    fn matches(&self, method: &Method, _class: &TargetClass) -> bool {
        self.names
            .iter()
            .any(|pattern| pattern_matches(pattern, method.name()))
    }
}

impl Pointcut for NameMatchMethodPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::new(TrueClassFilter)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::new(self.clone())
    }

    fn describe(&self) -> String {
        format!("NameMatchMethodPointcut{:?}", self.names)
    }
}

/// 正则切点，匹配 `声明接口.方法名`
#[derive(Debug, Clone)]
pub struct RegexMethodPointcut {
    patterns: Vec<Regex>,
    excluded: Vec<Regex>,
}

impl RegexMethodPointcut {
    pub fn new<I, S>(patterns: I) -> AopResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            patterns: compile_all(patterns)?,
            excluded: Vec::new(),
        })
    }

    pub fn excluding<I, S>(mut self, patterns: I) -> AopResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded = compile_all(patterns)?;
        Ok(self)
    }
}

fn compile_all<I, S>(patterns: I) -> AopResult<Vec<Regex>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|p| {
            Regex::new(p.as_ref())
                .map_err(|e| AopError::Config(format!("Invalid pointcut regex '{}': {}", p.as_ref(), e)))
        })
        .collect()
}

impl MethodMatcher for RegexMethodPointcut {
    fn matches(&self, method: &Method, _class: &TargetClass) -> bool {
        let signature = method.to_string();
        self.patterns.iter().any(|r| r.is_match(&signature))
            && !self.excluded.iter().any(|r| r.is_match(&signature))
    }
}

impl Pointcut for RegexMethodPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::new(TrueClassFilter)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::new(self.clone())
    }

    fn describe(&self) -> String {
        let patterns: Vec<_> = self.patterns.iter().map(Regex::as_str).collect();
        format!("RegexMethodPointcut{:?}", patterns)
    }
}

/// 切点表达式
///
/// 例如：`execution(* Calculator.add(..)) && !execution(* *.debug*(..))`
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// 匹配特定类型的特定方法
    Execution {
        type_pattern: String,
        method_pattern: String,
    },
    /// 目标类实现的接口或类名
    Within(String),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
}

impl Expression {
    fn matches(&self, method: &Method, class: &TargetClass) -> bool {
        match self {
            Expression::Execution {
                type_pattern,
                method_pattern,
            } => {
                pattern_matches(method_pattern, method.name())
                    && (pattern_matches(type_pattern, method.declaring())
                        || pattern_matches(type_pattern, class.name()))
            }
            Expression::Within(pattern) => {
                pattern_matches(pattern, class.name())
                    || class
                        .interfaces()
                        .iter()
                        .any(|i| pattern_matches(pattern, i.name()))
            }
            Expression::And(left, right) => left.matches(method, class) && right.matches(method, class),
            Expression::Or(left, right) => left.matches(method, class) || right.matches(method, class),
            Expression::Not(expr) => !expr.matches(method, class),
        }
    }

    /// 解析表达式
    ///
    /// 语法：`execution(返回类型 类型.方法(参数))`、`within(类型)`，
    /// 用 `&&`/`and`、`||`/`or`、`!`/`not` 和括号组合。
    pub fn parse(source: &str) -> AopResult<Self> {
        let tokens = tokenize(source)?;
        let mut parser = ExpressionParser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.tokens.get(parser.pos) {
            None => Ok(expr),
            Some(token) => Err(expression_error(source, &format!("unexpected token {:?}", token))),
        }
    }

    /// 解析 `execution` 的内部部分：`[public] 返回类型 类型.方法(参数)`
    ///
    /// 参数列表只检查括号，不参与匹配。代理的方法都是公开方法，`public` 修饰符总是成立。
    fn execution(body: &str) -> Option<Self> {
        let head = match body.split_once('(') {
            Some((head, params)) if params.trim_end().ends_with(')') => head,
            Some(_) => return None,
            None => body,
        };
        let parts: Vec<&str> = head.split_whitespace().collect();
        let method_part = match parts.as_slice() {
            ["public", _, method_part] | [_, method_part] | [method_part] => *method_part,
            _ => return None,
        };

        let (type_pattern, method_pattern) = match method_part.rsplit_once('.') {
            Some((t, m)) => (t, m),
            None => ("*", method_part),
        };
        if type_pattern.is_empty() || method_pattern.is_empty() {
            return None;
        }
        Some(Expression::Execution {
            type_pattern: type_pattern.to_string(),
            method_pattern: method_pattern.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Execution(String),
    Within(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn expression_error(source: &str, reason: &str) -> AopError {
    AopError::Config(format!("Invalid pointcut expression '{}': {}", source, reason))
}

fn tokenize(source: &str) -> AopResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            c if c.is_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    "execution" | "within" => {
                        let (body, next) = designator_body(&chars, i)
                            .ok_or_else(|| expression_error(source, "unbalanced parentheses"))?;
                        i = next;
                        if word == "execution" {
                            tokens.push(Token::Execution(body));
                        } else {
                            tokens.push(Token::Within(body.trim().to_string()));
                        }
                    }
                    other => {
                        return Err(expression_error(
                            source,
                            &format!("unknown designator '{}'", other),
                        ))
                    }
                }
            }
            other => {
                return Err(expression_error(
                    source,
                    &format!("unexpected character '{}'", other),
                ))
            }
        }
    }

    Ok(tokens)
}

/// 读取 `designator(...)` 的括号内容，返回内容和括号之后的位置
fn designator_body(chars: &[char], mut i: usize) -> Option<(String, usize)> {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    if chars.get(i) != Some(&'(') {
        return None;
    }
    let start = i + 1;
    let mut depth = 0usize;
    while i < chars.len() {
        match chars[i] {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((chars[start..i].iter().collect(), i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

struct ExpressionParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExpressionParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> AopResult<Expression> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> AopResult<Expression> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> AopResult<Expression> {
        match self.next() {
            Some(Token::Not) => Ok(Expression::Not(Box::new(self.parse_unary()?))),
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(AopError::Config("Invalid pointcut expression: expected ')'".into())),
                }
            }
            Some(Token::Execution(body)) => Expression::execution(&body).ok_or_else(|| {
                AopError::Config(format!("Invalid execution designator: execution({})", body))
            }),
            Some(Token::Within(pattern)) => Ok(Expression::Within(pattern)),
            other => Err(AopError::Config(format!(
                "Invalid pointcut expression: unexpected {:?}",
                other
            ))),
        }
    }
}

/// 表达式切点
#[derive(Debug, Clone)]
pub struct ExpressionPointcut {
    source: String,
    expression: Expression,
}

impl ExpressionPointcut {
    pub fn new(source: &str) -> AopResult<Self> {
        Ok(Self {
            source: source.to_string(),
            expression: Expression::parse(source)?,
        })
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

impl MethodMatcher for ExpressionPointcut {
    fn matches(&self, method: &Method, class: &TargetClass) -> bool {
        self.expression.matches(method, class)
    }
}

impl Pointcut for ExpressionPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::new(TrueClassFilter)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::new(self.clone())
    }

    fn describe(&self) -> String {
        format!("ExpressionPointcut: {}", self.source)
    }
}

/// 可组合切点：并集与交集
#[derive(Clone)]
pub struct ComposablePointcut {
    class_filter: Arc<dyn ClassFilter>,
    method_matcher: Arc<dyn MethodMatcher>,
}

impl ComposablePointcut {
    pub fn new() -> Self {
        Self {
            class_filter: Arc::new(TrueClassFilter),
            method_matcher: Arc::new(TrueMethodMatcher),
        }
    }

    pub fn from_pointcut(pointcut: &dyn Pointcut) -> Self {
        Self {
            class_filter: pointcut.class_filter(),
            method_matcher: pointcut.method_matcher(),
        }
    }

    pub fn with_class_filter(class_filter: Arc<dyn ClassFilter>) -> Self {
        Self {
            class_filter,
            method_matcher: Arc::new(TrueMethodMatcher),
        }
    }

    pub fn with_method_matcher(method_matcher: Arc<dyn MethodMatcher>) -> Self {
        Self {
            class_filter: Arc::new(TrueClassFilter),
            method_matcher,
        }
    }

    /// 并集
    pub fn union(self, other: &dyn Pointcut) -> Self {
        let left = self;
        let right_filter = other.class_filter();
        let right_matcher = other.method_matcher();
        Self {
            class_filter: Arc::new(UnionClassFilter(left.class_filter.clone(), right_filter.clone())),
            method_matcher: Arc::new(UnionMethodMatcher {
                left_filter: left.class_filter,
                left: left.method_matcher,
                right_filter,
                right: right_matcher,
            }),
        }
    }

    /// 交集
    pub fn intersection(self, other: &dyn Pointcut) -> Self {
        Self {
            class_filter: Arc::new(IntersectionClassFilter(self.class_filter, other.class_filter())),
            method_matcher: Arc::new(IntersectionMethodMatcher(
                self.method_matcher,
                other.method_matcher(),
            )),
        }
    }
}

impl Default for ComposablePointcut {
    fn default() -> Self {
        Self::new()
    }
}

impl Pointcut for ComposablePointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        self.class_filter.clone()
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        self.method_matcher.clone()
    }

    fn describe(&self) -> String {
        "ComposablePointcut".to_string()
    }
}

struct UnionClassFilter(Arc<dyn ClassFilter>, Arc<dyn ClassFilter>);

impl ClassFilter for UnionClassFilter {
    fn matches(&self, class: &TargetClass) -> bool {
        self.0.matches(class) || self.1.matches(class)
    }

    fn is_universal(&self) -> bool {
        self.0.is_universal() || self.1.is_universal()
    }
}

struct IntersectionClassFilter(Arc<dyn ClassFilter>, Arc<dyn ClassFilter>);

impl ClassFilter for IntersectionClassFilter {
    fn matches(&self, class: &TargetClass) -> bool {
        self.0.matches(class) && self.1.matches(class)
    }

    fn is_universal(&self) -> bool {
        self.0.is_universal() && self.1.is_universal()
    }
}

/// 并集中每一侧只在自己的类过滤器匹配时才参与
struct UnionMethodMatcher {
    left_filter: Arc<dyn ClassFilter>,
    left: Arc<dyn MethodMatcher>,
    right_filter: Arc<dyn ClassFilter>,
    right: Arc<dyn MethodMatcher>,
}

impl MethodMatcher for UnionMethodMatcher {
    fn matches(&self, method: &Method, class: &TargetClass) -> bool {
        (self.left_filter.matches(class) && self.left.matches(method, class))
            || (self.right_filter.matches(class) && self.right.matches(method, class))
    }

    fn is_runtime(&self) -> bool {
        self.left.is_runtime() || self.right.is_runtime()
    }

    fn matches_with_args(&self, method: &Method, class: &TargetClass, args: &Arguments) -> bool {
        let side = |filter: &Arc<dyn ClassFilter>, matcher: &Arc<dyn MethodMatcher>| {
            filter.matches(class)
                && matcher.matches(method, class)
                && (!matcher.is_runtime() || matcher.matches_with_args(method, class, args))
        };
        side(&self.left_filter, &self.left) || side(&self.right_filter, &self.right)
    }

    fn is_universal(&self) -> bool {
        self.left.is_universal() && self.left_filter.is_universal()
            || self.right.is_universal() && self.right_filter.is_universal()
    }
}

struct IntersectionMethodMatcher(Arc<dyn MethodMatcher>, Arc<dyn MethodMatcher>);

impl MethodMatcher for IntersectionMethodMatcher {
    fn matches(&self, method: &Method, class: &TargetClass) -> bool {
        self.0.matches(method, class) && self.1.matches(method, class)
    }

    fn is_runtime(&self) -> bool {
        self.0.is_runtime() || self.1.is_runtime()
    }

    fn matches_with_args(&self, method: &Method, class: &TargetClass, args: &Arguments) -> bool {
        let check = |m: &Arc<dyn MethodMatcher>| {
            if m.is_runtime() {
                m.matches_with_args(method, class, args)
            } else {
                m.matches(method, class)
            }
        };
        check(&self.0) && check(&self.1)
    }

    fn is_universal(&self) -> bool {
        self.0.is_universal() && self.1.is_universal()
    }
}

/// 简单的模式匹配（支持 `*` 通配符）
pub fn pattern_matches(pattern: &str, target: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == target;
    }

    let regex_pattern = format!(
        "^{}$",
        pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*")
    );
    Regex::new(&regex_pattern)
        .map(|regex| regex.is_match(target))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ReturnType;
    use std::any::TypeId;

    struct CalcTag;

    fn calc_id() -> TypeId {
        TypeId::of::<CalcTag>()
    }

    static CALC_METHODS: [Method; 3] = [
        Method::new("Calculator", "add", 0).with_params(2).returns(ReturnType::Value, "i32"),
        Method::new("Calculator", "divide", 1).with_params(2).returns(ReturnType::Value, "i32"),
        Method::new("Calculator", "debug_state", 2),
    ];
    static CALCULATOR: Interface = Interface::new("Calculator", &CALC_METHODS, calc_id);

    fn class() -> TargetClass {
        TargetClass::new("SimpleCalculator").implements(&CALCULATOR)
    }

    fn method(name: &str) -> &'static Method {
        CALCULATOR.method(name).unwrap()
    }

    #[test]
    fn test_pattern_matches() {
        assert!(pattern_matches("*", "anything"));
        assert!(pattern_matches("get*", "get_user"));
        assert!(pattern_matches("*Service", "UserService"));
        assert!(pattern_matches("*Serv*", "UserService"));
        assert!(!pattern_matches("get*", "set_user"));
        assert!(pattern_matches("a.b*", "a.bc"));
        assert!(!pattern_matches("a.b*", "axbc"));
    }

    #[test]
    fn test_name_match() {
        let pc = NameMatchMethodPointcut::new().with_names(["add", "debug*"]);
        let mm = pc.method_matcher();
        assert!(mm.matches(method("add"), &class()));
        assert!(mm.matches(method("debug_state"), &class()));
        assert!(!mm.matches(method("divide"), &class()));
    }

    #[test]
    fn test_regex_pointcut_with_exclusions() {
        let pc = RegexMethodPointcut::new([r"^Calculator\..*"])
            .unwrap()
            .excluding([r"\.debug_.*"])
            .unwrap();
        let mm = pc.method_matcher();
        assert!(mm.matches(method("divide"), &class()));
        assert!(!mm.matches(method("debug_state"), &class()));

        assert!(RegexMethodPointcut::new(["("]).is_err());
    }

    #[test]
    fn test_expression_parse_and_match() {
        let pc = ExpressionPointcut::new(
            "execution(* Calculator.*(..)) && !execution(* *.debug*(..))",
        )
        .unwrap();
        let mm = pc.method_matcher();
        assert!(mm.matches(method("add"), &class()));
        assert!(!mm.matches(method("debug_state"), &class()));

        let within = ExpressionPointcut::new("within(Simple*) or execution(* Other.add(..))").unwrap();
        assert!(within.method_matcher().matches(method("divide"), &class()));
        assert!(!within
            .method_matcher()
            .matches(method("divide"), &TargetClass::new("Other")));
    }

    #[test]
    fn test_expression_parse_errors() {
        assert!(Expression::parse("execution(* Calculator.add(..)").is_err());
        assert!(Expression::parse("bogus(x)").is_err());
        assert!(Expression::parse("execution(* A.b(..)) &&").is_err());
    }

    #[test]
    fn test_expression_without_return_type() {
        assert_eq!(
            Expression::parse("execution(Calculator.add(..))").unwrap(),
            Expression::Execution {
                type_pattern: "Calculator".into(),
                method_pattern: "add".into(),
            }
        );
    }

    #[test]
    fn test_execution_with_parameter_types_and_modifier() {
        let expected = Expression::Execution {
            type_pattern: "Calculator".into(),
            method_pattern: "add".into(),
        };
        assert_eq!(Expression::parse("execution(* Calculator.add(i32, i32))").unwrap(), expected);
        assert_eq!(Expression::parse("execution(public * Calculator.add(..))").unwrap(), expected);
        assert_eq!(
            Expression::parse("execution(public i32 Calculator.add(i32, String))").unwrap(),
            expected
        );

        let pc = ExpressionPointcut::new("execution(public * Simple*.div*(i32, i32))").unwrap();
        assert!(pc.method_matcher().matches(method("divide"), &class()));
    }

    #[test]
    fn test_execution_rejects_empty_patterns() {
        assert!(Expression::parse("execution(* .())").is_err());
        assert!(Expression::parse("execution(* Calculator.(..))").is_err());
        assert!(Expression::parse("execution(* .add(..))").is_err());
        assert!(Expression::parse("execution()").is_err());
        assert!(Expression::parse("execution(private * Calculator.add(..))").is_err());
        assert!(Expression::parse("execution(* Calculator.add(..) extra)").is_err());
    }

    #[test]
    fn test_composable_union_and_intersection() {
        let adds = NameMatchMethodPointcut::new().with_name("add");
        let divides = NameMatchMethodPointcut::new().with_name("divide");

        let union = ComposablePointcut::from_pointcut(&adds).union(&divides);
        assert!(union.method_matcher().matches(method("add"), &class()));
        assert!(union.method_matcher().matches(method("divide"), &class()));
        assert!(!union.method_matcher().matches(method("debug_state"), &class()));

        let none = ComposablePointcut::from_pointcut(&adds).intersection(&divides);
        assert!(!none.method_matcher().matches(method("add"), &class()));

        let other_types = ComposablePointcut::with_class_filter(Arc::new(TypeNameClassFilter::new("Other*")));
        assert!(!other_types.class_filter().matches(&class()));
        assert!(InterfaceClassFilter::new(&CALCULATOR).matches(&class()));
    }

    #[test]
    fn test_dynamic_matcher() {
        let dm = DynamicMethodMatcher::new(|_, args| args.get::<i32>(0).map_or(false, |n| *n > 0))
            .with_static(|m, _| m.name() == "add");
        assert!(dm.is_runtime());
        assert!(dm.matches(method("add"), &class()));
        assert!(!dm.matches(method("divide"), &class()));
        assert!(dm.matches_with_args(method("add"), &class(), &Arguments::new().with(1_i32)));
        assert!(!dm.matches_with_args(method("add"), &class(), &Arguments::new().with(-1_i32)));
    }
}
