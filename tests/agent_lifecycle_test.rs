use std::time::Duration;

use fleetcron::shutdown::supervise;
use fleetcron::{Application, ShutdownManager};
use fleetcron_core::{
    AppConfig, CommandRepository, CommandTarget, CommandType, MachineRepository, MachineStatus,
};
use fleetcron_infrastructure::DatabaseManager;

fn config_in(dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite:{}?mode=rwc", dir.join("fleet.db").display());
    config.database.max_connections = 1;
    config.agent.home_dir = Some(dir.join("home"));
    config.agent.timezone = "UTC".to_string();
    config
}

#[tokio::test]
async fn agent_registers_consumes_commands_and_goes_offline() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let app = std::sync::Arc::new(Application::new(config.clone(), None).await.unwrap());
    let machine_id = app.machine_id().to_string();
    let command = app
        .send(CommandType::ReloadJobs, CommandTarget::All)
        .await
        .unwrap();

    let shutdown = ShutdownManager::new();
    let handle = {
        let app = app.clone();
        let rx = shutdown.subscribe().await;
        tokio::spawn(async move { app.run(rx).await })
    };

    // 命令通道启动后立即轮询一次
    let observer = DatabaseManager::from_config(&config.database).await.unwrap();
    let commands = observer.command_repository();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let pending = commands.list_pending_for(&machine_id).await.unwrap();
            if pending.iter().all(|c| c.id != command.id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("命令未被消费");

    let rows = app.machines().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].rank, Some(1));
    assert_eq!(rows[0].order, 1);

    shutdown.shutdown().await;
    handle.await.unwrap().unwrap();

    let machine = observer
        .machine_repository()
        .get(&machine_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(machine.status, MachineStatus::Offline);
    observer.close().await;
}

#[tokio::test]
async fn restart_reuses_machine_identity() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let first = Application::new(config.clone(), None).await.unwrap();
    let id = first.machine_id().to_string();
    first.database().close().await;

    let second = Application::new(config, None).await.unwrap();
    assert_eq!(second.machine_id(), id);
    second.database().close().await;
}

#[tokio::test]
async fn agent_exits_with_error_when_registration_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let app = std::sync::Arc::new(Application::new(config, None).await.unwrap());
    app.database().close().await;

    let shutdown = ShutdownManager::new();
    let handle = {
        let app = app.clone();
        let rx = shutdown.subscribe().await;
        tokio::spawn(async move { app.run(rx).await })
    };

    // 没有关闭信号，代理自行失败也必须让监督者返回
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        supervise(
            handle,
            std::future::pending::<()>(),
            &shutdown,
            Duration::from_secs(1),
        ),
    )
    .await
    .expect("代理失败后监督者未返回");

    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("注册本机失败"));
}
