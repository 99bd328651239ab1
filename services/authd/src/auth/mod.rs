//! 鉴权模块：指纹推导、凭证编解码、会话签发与身份存储。

pub(crate) mod authority;
pub(crate) mod cache;
pub(crate) mod codec;
pub(crate) mod error;
pub(crate) mod fingerprint;
pub(crate) mod handlers;
pub(crate) mod password;
pub(crate) mod request;
pub(crate) mod store;
