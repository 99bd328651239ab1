//! 鉴权 HTTP 接口处理模块。

mod http;
mod session;

pub(crate) use http::{login_handler, refresh_handler, register_handler, verify_handler};
