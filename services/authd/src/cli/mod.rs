//! authd CLI 分发：`run`、`doctor`、`fingerprint`、`version`。

use anyhow::{Context, anyhow, bail};
use fpa_shared_protocol::ClientData;
use serde_json::json;

use crate::{
    auth::{
        fingerprint::{self, FingerprintInputs},
        store::FileIdentityStore,
    },
    config::AuthConfig,
};

/// CLI 分发结果。
pub(crate) enum CliDispatch {
    /// 继续进入 authd 主循环。
    Run,
    /// 命令已处理完成，主程序应退出。
    Exit,
}

/// 解析并执行 authd CLI。
pub(crate) fn dispatch(args: &[String]) -> anyhow::Result<CliDispatch> {
    if args.is_empty() {
        return Ok(CliDispatch::Run);
    }

    let cmd = args[0].trim();
    if cmd.is_empty() || cmd == "run" {
        return Ok(CliDispatch::Run);
    }

    if matches!(cmd, "-h" | "--help" | "help") {
        print_root_help();
        return Ok(CliDispatch::Exit);
    }

    match cmd {
        "doctor" => {
            let format = parse_doctor_format(&args[1..])?;
            run_doctor(format);
            Ok(CliDispatch::Exit)
        }
        "fingerprint" => {
            let cmd = parse_fingerprint_command(&args[1..])?;
            println!("{}", fingerprint::derive(&cmd.into_inputs()?));
            Ok(CliDispatch::Exit)
        }
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(CliDispatch::Exit)
        }
        other => Err(anyhow!(
            "unknown command: {other}; run `fpa-authd --help` for usage"
        )),
    }
}

/// `doctor` 输出格式。
#[derive(Debug, PartialEq, Eq)]
enum DoctorFormat {
    Text,
    Json,
}

/// 解析 doctor 的 `--format` 参数。
fn parse_doctor_format(args: &[String]) -> anyhow::Result<DoctorFormat> {
    if args.is_empty() {
        return Ok(DoctorFormat::Text);
    }
    if args.len() == 2 && args[0] == "--format" {
        return match args[1].as_str() {
            "text" => Ok(DoctorFormat::Text),
            "json" => Ok(DoctorFormat::Json),
            other => Err(anyhow!("unsupported doctor format: {other}")),
        };
    }
    Err(anyhow!("usage: fpa-authd doctor [--format text|json]"))
}

/// 打印生效配置（密钥不输出）并按健康度设置退出码。
fn run_doctor(format: DoctorFormat) {
    let config = AuthConfig::from_env();
    let store = config
        .as_ref()
        .map_err(|err| format!("{err:#}"))
        .and_then(|config| {
            FileIdentityStore::open(&config.store_path).map_err(|err| err.to_string())
        });
    let healthy = config.is_ok() && store.is_ok();

    match format {
        DoctorFormat::Text => {
            match &config {
                Ok(config) => {
                    println!("addr: {}", config.addr);
                    println!("store-path: {}", config.store_path.display());
                    println!("key-mode: {}", config.key_mode.as_str());
                    println!(
                        "secret-key: {}",
                        if config.has_secret() { "set" } else { "unset" }
                    );
                    println!("token-ttl-sec: {}", config.token_ttl_sec);
                    println!("refresh-grace-sec: {}", config.refresh_grace_sec);
                    println!("allowed-origins: {}", config.allowed_origins.join(","));
                    println!("fingerprint-cache: {}", config.fingerprint_cache);
                    println!("cookie-secure: {}", config.cookie_secure);
                    println!("debug-routes: {}", config.debug_routes);
                }
                Err(err) => println!("config: invalid ({err:#})"),
            }
            match &store {
                Ok(_) => println!("store: ok"),
                Err(err) => println!("store: error ({err})"),
            }
        }
        DoctorFormat::Json => {
            let payload = match &config {
                Ok(config) => json!({
                    "healthy": healthy,
                    "addr": config.addr,
                    "storePath": config.store_path.display().to_string(),
                    "keyMode": config.key_mode.as_str(),
                    "secretKeySet": config.has_secret(),
                    "tokenTtlSec": config.token_ttl_sec,
                    "refreshGraceSec": config.refresh_grace_sec,
                    "allowedOrigins": config.allowed_origins,
                    "fingerprintCache": config.fingerprint_cache,
                    "cookieSecure": config.cookie_secure,
                    "debugRoutes": config.debug_routes,
                    "storeError": store.as_ref().err(),
                }),
                Err(err) => json!({
                    "healthy": false,
                    "configError": format!("{err:#}"),
                }),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "{}".to_string())
            );
        }
    }

    if !healthy {
        std::process::exit(1);
    }
}

/// `fingerprint` 子命令参数。
#[derive(Debug, Default, PartialEq, Eq)]
struct FingerprintCommand {
    client_type: String,
    ip: String,
    user_agent: String,
    salt: Option<String>,
    client_data: Option<String>,
}

impl FingerprintCommand {
    fn into_inputs(self) -> anyhow::Result<FingerprintInputs> {
        let mut inputs = FingerprintInputs::parse(&self.client_type, &self.ip, &self.user_agent)?;
        if let Some(raw) = self.client_data {
            let data = ClientData::from_header_value(&raw).map_err(|err| anyhow!(err))?;
            inputs = inputs.with_attributes(data)?;
        }
        if let Some(salt) = self.salt {
            inputs = inputs.with_session_salt(&salt);
        }
        Ok(inputs)
    }
}

/// 解析 `--client-type T --ip A [--ua S] [--salt S] [--client-data JSON]`。
fn parse_fingerprint_command(args: &[String]) -> anyhow::Result<FingerprintCommand> {
    let mut cmd = FingerprintCommand::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .with_context(|| format!("missing value for {flag}"))?
            .clone();
        match flag.as_str() {
            "--client-type" => cmd.client_type = value,
            "--ip" => cmd.ip = value,
            "--ua" => cmd.user_agent = value,
            "--salt" => cmd.salt = Some(value),
            "--client-data" => cmd.client_data = Some(value),
            other => bail!("unknown fingerprint flag: {other}"),
        }
    }
    if cmd.client_type.is_empty() || cmd.ip.is_empty() {
        bail!(
            "usage: fpa-authd fingerprint --client-type web|mobile --ip ADDR [--ua UA] [--salt SALT] [--client-data JSON]"
        );
    }
    Ok(cmd)
}

/// 打印 root help。
fn print_root_help() {
    println!("fpa-authd usage:");
    println!("  fpa-authd run");
    println!("  fpa-authd doctor [--format text|json]");
    println!(
        "  fpa-authd fingerprint --client-type web|mobile --ip ADDR [--ua UA] [--salt SALT] [--client-data JSON]"
    );
    println!("  fpa-authd version");
}

#[cfg(test)]
mod tests {
    use super::{DoctorFormat, parse_doctor_format, parse_fingerprint_command};
    use crate::auth::fingerprint::derive;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn doctor_format_parsing() {
        assert_eq!(parse_doctor_format(&[]).expect("text"), DoctorFormat::Text);
        assert_eq!(
            parse_doctor_format(&args(&["--format", "json"])).expect("json"),
            DoctorFormat::Json
        );
        assert!(parse_doctor_format(&args(&["--format", "yaml"])).is_err());
        assert!(parse_doctor_format(&args(&["json"])).is_err());
    }

    #[test]
    fn fingerprint_command_matches_server_derivation() {
        let cmd = parse_fingerprint_command(&args(&[
            "--client-type",
            "web",
            "--ip",
            "203.0.113.5",
            "--ua",
            "Mozilla/5.0",
        ]))
        .expect("parse");
        let from_cli = derive(&cmd.into_inputs().expect("inputs"));
        let direct = derive(
            &crate::auth::fingerprint::FingerprintInputs::parse("web", "203.0.113.5", "Mozilla/5.0")
                .expect("inputs"),
        );
        assert_eq!(from_cli, direct);
    }

    #[test]
    fn fingerprint_command_salt_changes_output() {
        let base = ["--client-type", "mobile", "--ip", "10.0.0.1"];
        let plain = parse_fingerprint_command(&args(&base)).expect("parse");
        let mut salted_args = base.to_vec();
        salted_args.extend(["--salt", "s3cr3t"]);
        let salted = parse_fingerprint_command(&args(&salted_args)).expect("parse");
        assert_ne!(
            derive(&plain.into_inputs().expect("inputs")),
            derive(&salted.into_inputs().expect("inputs"))
        );
    }

    #[test]
    fn fingerprint_command_rejects_bad_usage() {
        assert!(parse_fingerprint_command(&args(&["--ip", "10.0.0.1"])).is_err());
        assert!(parse_fingerprint_command(&args(&["--client-type"])).is_err());
        assert!(
            parse_fingerprint_command(&args(&["--client-type", "web", "--port", "1"])).is_err()
        );
    }
}
