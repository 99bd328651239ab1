//! authd 二进制入口：解析 CLI、初始化日志后启动应用。

mod api;
mod app;
mod auth;
mod cli;
mod config;
mod logging;
mod state;

#[tokio::main]
/// 启动 authd 服务。
async fn main() -> anyhow::Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<String>>();
    match cli::dispatch(&args)? {
        cli::CliDispatch::Run => {}
        cli::CliDispatch::Exit => return Ok(()),
    }

    let _log_runtime = logging::init("authd")?;
    let config = config::AuthConfig::from_env()?;
    app::run(config).await
}
