//! Chimera AOP 过程宏
//!
//! 提供 `#[proxied]`：把 trait 声明为可代理接口。

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, ItemTrait, Meta, Token};

mod proxied;
mod utils;

/// `#[proxied]` 属性宏
///
/// 为 trait 生成方法描述符表、接口描述符，以及让 `InterfaceProxy` / `ClassProxy`
/// 实现该 trait 的代码，使 `ProxyFactory::get_proxy_as::<dyn Trait>()` 可用。
///
/// 约束：
/// - 方法接收者必须是 `&self`，不能是泛型或 async 方法
/// - 参数必须是实现 `Clone + Send + Sync + 'static` 的具名类型
/// - 返回类型必须是 `AopResult<T>`；`T` 为 `()`、`Option<U>`、`Arc<dyn 本 trait>` 或其他值类型
/// - 最后一个参数类型为 `VarArgs` 时视为可变参数方法
///
/// 方法上可用的辅助属性：
/// - `#[throws(kinds::IO, ...)]`：声明方法可能抛出的受检故障
/// - `#[sealed]`：方法不可被子类代理覆盖
///
/// 使用示例：
/// ```ignore
/// use chimera_aop::prelude::*;
/// use chimera_aop_macros::proxied;
///
/// #[proxied]
/// pub trait Accounts {
///     #[throws(kinds::IO)]
///     fn balance(&self, id: u64) -> AopResult<i64>;
///     fn find_owner(&self, id: u64) -> AopResult<Option<String>>;
/// }
///
/// // 描述类自身方法的接口，只实现这类接口的目标使用子类代理
/// #[proxied(class_methods, name = "Ledger")]
/// pub trait LedgerMethods {
///     fn total(&self) -> AopResult<i64>;
/// }
/// ```
#[proc_macro_attribute]
pub fn proxied(attr: TokenStream, item: TokenStream) -> TokenStream {
    let metas = parse_macro_input!(attr with Punctuated::<Meta, Token![,]>::parse_terminated);
    let item = parse_macro_input!(item as ItemTrait);

    proxied::ProxiedOptions::from_metas(metas)
        .and_then(|options| proxied::expand(options, item))
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
