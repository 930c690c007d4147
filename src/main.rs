use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use fleetcron::shutdown::supervise;
use fleetcron::{Application, ShutdownManager};
use fleetcron_core::{logging::init_logging, AppConfig, CommandTarget, CommandType};
use tokio::signal;
use tracing::{error, info};

fn cli() -> Command {
    Command::new("fleetcron")
        .version("1.0.0")
        .about("舰队级定时任务代理")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径（默认依次查找 fleetcron.toml、config/fleetcron.toml、~/.fleetcron/fleetcron.toml）")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info")
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"])
                .default_value("pretty")
                .global(true),
        )
        .subcommand(Command::new("run").about("启动代理（默认）"))
        .subcommand(
            Command::new("send")
                .about("向舰队发出运维命令")
                .arg(
                    Arg::new("command")
                        .value_name("COMMAND")
                        .help("命令类型")
                        .value_parser(["reload-jobs", "reload-config"])
                        .required(true),
                )
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .value_name("MACHINE_ID")
                        .help("目标机器ID，默认全部机器")
                        .default_value("all"),
                ),
        )
        .subcommand(Command::new("machines").about("列出注册表中的机器及存活状态"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config_path = matches.get_one::<String>("config").cloned();
    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    let log_format = matches
        .get_one::<String>("log-format")
        .map(String::as_str)
        .unwrap_or("pretty");

    init_logging(log_level, log_format)?;

    let resolved_path = AppConfig::resolve_path(config_path.as_deref())?;
    match &resolved_path {
        Some(path) => info!("配置文件: {}", path.display()),
        None => info!("未找到配置文件，使用默认配置和环境变量"),
    }
    let config = AppConfig::load_from(resolved_path.as_deref())
        .with_context(|| format!("加载配置失败: {:?}", resolved_path))?;

    match matches.subcommand() {
        Some(("send", sub)) => send(config, resolved_path, sub).await,
        Some(("machines", _)) => machines(config, resolved_path).await,
        _ => run(config, resolved_path).await,
    }
}

async fn run(config: AppConfig, config_path: Option<PathBuf>) -> Result<()> {
    info!("启动 fleetcron 代理");
    let grace = Duration::from_secs(config.agent.shutdown_grace_seconds + 10);

    let app = Arc::new(Application::new(config, config_path).await?);
    info!("本机ID: {}", app.machine_id());

    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    let result = supervise(app_handle, wait_for_shutdown_signal(), &shutdown_manager, grace).await;
    if let Err(e) = &result {
        error!("代理异常退出: {e:#}");
    }
    result
}

async fn send(config: AppConfig, config_path: Option<PathBuf>, sub: &ArgMatches) -> Result<()> {
    let command_type: CommandType = sub
        .get_one::<String>("command")
        .context("缺少命令类型")?
        .parse()
        .map_err(anyhow::Error::msg)?;
    let target = CommandTarget::parse(
        sub.get_one::<String>("target")
            .map(String::as_str)
            .unwrap_or("all"),
    );

    let app = Application::new(config, config_path).await?;
    let command = app.send(command_type, target).await?;
    println!(
        "已发出命令 {} ({}) -> {}",
        command.id, command.command_type, command.target
    );
    app.database().close().await;
    Ok(())
}

async fn machines(config: AppConfig, config_path: Option<PathBuf>) -> Result<()> {
    let app = Application::new(config, config_path).await?;
    let rows = app.machines().await?;

    println!(
        "{:<38} {:<24} {:>5} {:>5} {:<8} {:>10}",
        "MACHINE_ID", "HOSTNAME", "ORDER", "RANK", "STATUS", "LAST_SEEN"
    );
    for row in rows {
        let rank = row
            .rank
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        let marker = if row.machine_id == app.machine_id() { " *" } else { "" };
        println!(
            "{:<38} {:<24} {:>5} {:>5} {:<8} {:>9}s{marker}",
            row.machine_id, row.hostname, row.order, rank, row.status, row.seconds_since_seen
        );
    }
    app.database().close().await;
    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("安装Ctrl+C信号处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("安装SIGTERM信号处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn send_defaults_to_all_machines() {
        let matches = cli().get_matches_from(["fleetcron", "send", "reload-jobs"]);
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "send");
        assert_eq!(sub.get_one::<String>("target").unwrap(), "all");
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let matches = cli().get_matches_from(["fleetcron", "machines", "--log-format", "json"]);
        assert_eq!(matches.get_one::<String>("log-format").unwrap(), "json");
    }

    #[test]
    fn unknown_command_type_is_rejected() {
        assert!(cli()
            .try_get_matches_from(["fleetcron", "send", "restart"])
            .is_err());
    }
}
