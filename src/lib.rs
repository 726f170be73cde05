//! boxforge：代理订阅到 sing-box 形态路由配置的编译器与归一化器。
//!
//! 三个对外入口：
//! - [`compile::convert`] 把订阅文本编译成完整文档
//! - [`profile::normalize`] 对持久化文档做幂等迁移
//! - [`profile::settings::apply`] 把应用设置投影到文档

pub mod common;
pub mod compile;
pub mod profile;

pub use common::ConvertError;
pub use compile::{convert, Conversion};
pub use profile::{
    apply, apply_text, normalize, normalize_text, AppSettings, NormalizeOutcome, RoutingProfile,
};
