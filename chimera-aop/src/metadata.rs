//! 方法、接口与目标类描述符
//!
//! 代理不依赖运行时反射：每个可代理的 trait 由 `#[proxied]` 生成一张静态方法表，
//! 方法以 `(声明接口, 槽位)` 作为稳定标识，用作拦截链缓存的键。

use crate::fault::FaultKind;
use std::any::TypeId;
use std::fmt;

/// 方法返回值形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    /// 无返回值
    Unit,
    /// 非空值，拦截链返回空值是调用错误
    Value,
    /// 可空值（`Option<T>`）
    Nullable,
    /// 返回与代理同类型的对象引用，适用“返回自身即返回代理”的替换规则
    SelfRef,
}

impl ReturnType {
    pub fn is_nullable(self) -> bool {
        matches!(self, ReturnType::Unit | ReturnType::Nullable)
    }
}

/// 方法描述符
#[derive(Debug)]
pub struct Method {
    declaring: &'static str,
    name: &'static str,
    slot: usize,
    params: usize,
    variadic: bool,
    returns: ReturnType,
    return_type_name: &'static str,
    throws: &'static [&'static FaultKind],
    is_final: bool,
}

impl Method {
    pub const fn new(declaring: &'static str, name: &'static str, slot: usize) -> Self {
        Self {
            declaring,
            name,
            slot,
            params: 0,
            variadic: false,
            returns: ReturnType::Unit,
            return_type_name: "()",
            throws: &[],
            is_final: false,
        }
    }

    pub const fn with_params(mut self, params: usize) -> Self {
        self.params = params;
        self
    }

    /// 最后一个参数为 [`VarArgs`](crate::VarArgs)
    pub const fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub const fn returns(mut self, returns: ReturnType, type_name: &'static str) -> Self {
        self.returns = returns;
        self.return_type_name = type_name;
        self
    }

    /// 声明可能抛出的故障类型
    pub const fn throws(mut self, throws: &'static [&'static FaultKind]) -> Self {
        self.throws = throws;
        self
    }

    /// 不可被子类代理覆盖的方法
    pub const fn sealed(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn declaring(&self) -> &'static str {
        self.declaring
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn param_count(&self) -> usize {
        self.params
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    pub fn return_type(&self) -> ReturnType {
        self.returns
    }

    pub fn return_type_name(&self) -> &'static str {
        self.return_type_name
    }

    pub fn declared_faults(&self) -> &'static [&'static FaultKind] {
        self.throws
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn key(&self) -> MethodKey {
        MethodKey {
            declaring: self.declaring,
            slot: self.slot,
        }
    }

    /// 故障类型是否被方法签名声明（声明类型的子类型同样算已声明）
    pub fn declares(&self, kind: &FaultKind) -> bool {
        self.throws.iter().any(|declared| kind.is_a(declared))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring, self.name)
    }
}

/// 方法缓存键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub declaring: &'static str,
    pub slot: usize,
}

/// 接口描述符
///
/// `class_surface` 接口描述的是类自身的方法，而不是可供接口代理使用的接口，
/// 只实现了这类接口的目标会选择子类代理策略。
pub struct Interface {
    name: &'static str,
    methods: &'static [Method],
    type_id: fn() -> TypeId,
    class_surface: bool,
}

impl Interface {
    pub const fn new(name: &'static str, methods: &'static [Method], type_id: fn() -> TypeId) -> Self {
        Self {
            name,
            methods,
            type_id,
            class_surface: false,
        }
    }

    pub const fn class_surface(mut self) -> Self {
        self.class_surface = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn methods(&self) -> &'static [Method] {
        self.methods
    }

    pub fn method(&self, name: &str) -> Option<&'static Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    pub fn is_class_surface(&self) -> bool {
        self.class_surface
    }

    /// 方法是否由此接口声明
    pub fn declares(&self, method: &Method) -> bool {
        method.declaring == self.name && self.methods.get(method.slot).is_some()
    }
}

impl PartialEq for Interface {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.type_id() == other.type_id()
    }
}

impl Eq for Interface {}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.name)
            .field("methods", &self.methods.len())
            .field("class_surface", &self.class_surface)
            .finish()
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 代理自动附加的标记接口
pub mod markers {
    use super::{Interface, Method, ReturnType};
    use std::any::TypeId;

    struct ProxyMarkerTag;
    struct AdvisedTag;
    struct DecoratingProxyTag;
    struct IdentityTag;

    fn proxy_marker_id() -> TypeId {
        TypeId::of::<ProxyMarkerTag>()
    }

    fn advised_id() -> TypeId {
        TypeId::of::<AdvisedTag>()
    }

    fn decorating_proxy_id() -> TypeId {
        TypeId::of::<DecoratingProxyTag>()
    }

    fn identity_id() -> TypeId {
        TypeId::of::<IdentityTag>()
    }

    /// 标识对象是由引擎生成的代理
    pub static PROXY_MARKER: Interface = Interface::new("AopProxyMarker", &[], proxy_marker_id);

    static ADVISED_METHODS: [Method; 6] = [
        Method::new("Advised", "is_frozen", 0).returns(ReturnType::Value, "bool"),
        Method::new("Advised", "is_expose_proxy", 1).returns(ReturnType::Value, "bool"),
        Method::new("Advised", "is_proxy_target_class", 2).returns(ReturnType::Value, "bool"),
        Method::new("Advised", "advisor_count", 3).returns(ReturnType::Value, "usize"),
        Method::new("Advised", "target_class_name", 4).returns(ReturnType::Nullable, "String"),
        Method::new("Advised", "to_proxy_config_string", 5).returns(ReturnType::Value, "String"),
    ];

    /// 配置自省接口，代理直接转发给 `AdvisedSupport`，不经过拦截链
    pub static ADVISED: Interface = Interface::new("Advised", &ADVISED_METHODS, advised_id);

    static DECORATING_PROXY_METHODS: [Method; 1] =
        [Method::new("DecoratingProxy", "decorated_class", 0).returns(ReturnType::Nullable, "String")];

    /// 暴露被装饰的目标类
    pub static DECORATING_PROXY: Interface =
        Interface::new("DecoratingProxy", &DECORATING_PROXY_METHODS, decorating_proxy_id);

    static IDENTITY_METHODS: [Method; 2] = [
        Method::new("ObjectIdentity", "equals", 0)
            .with_params(1)
            .returns(ReturnType::Value, "bool"),
        Method::new("ObjectIdentity", "hash_code", 1).returns(ReturnType::Value, "u64"),
    ];

    /// 相等与哈希
    ///
    /// 不出现在代理接口列表中。目标类声明了 `with_equality` / `with_hash` 时，
    /// 代理以这两个方法经过拦截链调用目标的 [`Dispatch::equals`](crate::Dispatch::equals)
    /// 与 [`Dispatch::hash_code`](crate::Dispatch::hash_code)。
    pub static IDENTITY: Interface = Interface::new("ObjectIdentity", &IDENTITY_METHODS, identity_id);

    pub fn equals_method() -> &'static Method {
        &IDENTITY_METHODS[0]
    }

    pub fn hash_code_method() -> &'static Method {
        &IDENTITY_METHODS[1]
    }

    pub fn is_marker(interface: &Interface) -> bool {
        interface == &PROXY_MARKER
            || interface == &ADVISED
            || interface == &DECORATING_PROXY
            || interface == &IDENTITY
    }
}

/// 构造器可用性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constructor {
    /// 无参构造，子类代理可直接生成
    Default,
    /// 需要显式提供指定数量的构造参数
    WithArgs(usize),
    /// 没有可访问的构造器
    Inaccessible,
}

/// 目标类描述符
#[derive(Debug, Clone)]
pub struct TargetClass {
    name: String,
    type_id: Option<TypeId>,
    interfaces: Vec<&'static Interface>,
    class_methods: Vec<&'static Interface>,
    is_final: bool,
    constructor: Constructor,
    defines_equality: bool,
    defines_hash: bool,
    raw_target_access: bool,
    proxy_class: bool,
}

impl TargetClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: None,
            interfaces: Vec::new(),
            class_methods: Vec::new(),
            is_final: false,
            constructor: Constructor::Default,
            defines_equality: false,
            defines_hash: false,
            raw_target_access: false,
            proxy_class: false,
        }
    }

    pub fn of<T: 'static>(name: impl Into<String>) -> Self {
        let mut class = Self::new(name);
        class.type_id = Some(TypeId::of::<T>());
        class
    }

    /// 没有目标类时，以声明接口合成一个描述符
    pub fn for_interface(interface: &'static Interface) -> Self {
        Self::new(interface.name()).implements(interface)
    }

    /// 类实现的接口；`class_surface` 接口记为类自身的方法
    pub fn implements(mut self, interface: &'static Interface) -> Self {
        let list = if interface.is_class_surface() {
            &mut self.class_methods
        } else {
            &mut self.interfaces
        };
        if !list.iter().any(|i| *i == interface) {
            list.push(interface);
        }
        self
    }

    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn constructor(mut self, constructor: Constructor) -> Self {
        self.constructor = constructor;
        self
    }

    /// 目标自行实现相等比较，代理把比较作为普通方法经拦截链转给目标
    pub fn with_equality(mut self) -> Self {
        self.defines_equality = true;
        self
    }

    pub fn with_hash(mut self) -> Self {
        self.defines_hash = true;
        self
    }

    /// 目标需要拿到原始引用，代理不做“返回自身”替换
    pub fn raw_target_access(mut self) -> Self {
        self.raw_target_access = true;
        self
    }

    pub(crate) fn mark_proxy_class(mut self) -> Self {
        self.proxy_class = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    /// 可供接口代理使用的接口（不含类方法面）
    pub fn interfaces(&self) -> &[&'static Interface] {
        &self.interfaces
    }

    pub fn class_method_surfaces(&self) -> &[&'static Interface] {
        &self.class_methods
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn constructor_kind(&self) -> Constructor {
        self.constructor
    }

    pub fn defines_equality(&self) -> bool {
        self.defines_equality
    }

    pub fn defines_hash(&self) -> bool {
        self.defines_hash
    }

    pub fn has_raw_target_access(&self) -> bool {
        self.raw_target_access
    }

    pub fn is_proxy_class(&self) -> bool {
        self.proxy_class
    }

    /// 类可调用的全部方法：类方法面在前，接口方法在后
    pub fn methods(&self) -> impl Iterator<Item = &'static Method> + '_ {
        self.class_methods
            .iter()
            .chain(self.interfaces.iter())
            .flat_map(|iface| iface.methods().iter())
    }

    pub fn is_assignable_to(&self, interface: &Interface) -> bool {
        self.interfaces
            .iter()
            .chain(self.class_methods.iter())
            .any(|i| *i == interface)
    }

    /// 除标记接口外、用户声明的接口
    pub fn user_interfaces(&self) -> impl Iterator<Item = &'static Interface> + '_ {
        self.interfaces
            .iter()
            .copied()
            .filter(|i| !markers::is_marker(i))
    }
}

impl fmt::Display for TargetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::kinds;

    struct GreeterTag;
    struct PrinterTag;

    fn greeter_id() -> TypeId {
        TypeId::of::<GreeterTag>()
    }

    fn printer_id() -> TypeId {
        TypeId::of::<PrinterTag>()
    }

    static GREET_THROWS: [&FaultKind; 1] = [&kinds::IO];
    static GREETER_METHODS: [Method; 2] = [
        Method::new("Greeter", "greet", 0)
            .with_params(1)
            .returns(ReturnType::Value, "String")
            .throws(&GREET_THROWS),
        Method::new("Greeter", "shout", 1).with_params(2).variadic(),
    ];
    static GREETER: Interface = Interface::new("Greeter", &GREETER_METHODS, greeter_id);

    static PRINTER_METHODS: [Method; 1] = [Method::new("Printer", "print", 0).sealed()];
    static PRINTER: Interface = Interface::new("Printer", &PRINTER_METHODS, printer_id).class_surface();

    #[test]
    fn test_method_descriptor() {
        let greet = GREETER.method("greet").unwrap();
        assert_eq!(greet.to_string(), "Greeter.greet");
        assert_eq!(greet.param_count(), 1);
        assert_eq!(greet.return_type(), ReturnType::Value);
        assert!(greet.declares(&kinds::IO));
        assert!(!greet.declares(&kinds::EXCEPTION));
        assert_eq!(greet.key(), MethodKey { declaring: "Greeter", slot: 0 });

        let shout = GREETER.method("shout").unwrap();
        assert!(shout.is_variadic());
        assert!(shout.return_type().is_nullable());
    }

    #[test]
    fn test_target_class_surfaces() {
        let class = TargetClass::of::<String>("Service")
            .implements(&GREETER)
            .implements(&PRINTER)
            .implements(&GREETER);

        assert_eq!(class.interfaces().len(), 1);
        assert_eq!(class.class_method_surfaces().len(), 1);
        assert!(class.is_assignable_to(&PRINTER));
        assert_eq!(class.methods().count(), 3);
        assert_eq!(class.methods().next().map(|m| m.name()), Some("print"));
        assert!(PRINTER.method("print").unwrap().is_final());
    }

    #[test]
    fn test_markers_are_filtered_from_user_interfaces() {
        let class = TargetClass::new("Proxy")
            .implements(&GREETER)
            .implements(&markers::ADVISED)
            .implements(&markers::PROXY_MARKER);

        let user: Vec<_> = class.user_interfaces().map(|i| i.name()).collect();
        assert_eq!(user, vec!["Greeter"]);
    }
}
