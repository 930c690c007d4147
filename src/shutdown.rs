use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 优雅关闭管理器
///
/// 时刻驱动和命令通道各自订阅，收到信号后在下一个等待点退出。
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_tx: Arc<RwLock<Option<broadcast::Sender<()>>>>,
    is_shutdown: Arc<RwLock<bool>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            shutdown_tx: Arc::new(RwLock::new(Some(shutdown_tx))),
            is_shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// 订阅关闭信号；已关闭时返回立即就绪的接收器
    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        let shutdown_tx = self.shutdown_tx.read().await;
        if let Some(ref tx) = *shutdown_tx {
            tx.subscribe()
        } else {
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(());
            rx
        }
    }

    /// 触发关闭，重复调用无效果
    pub async fn shutdown(&self) {
        let mut is_shutdown = self.is_shutdown.write().await;
        if *is_shutdown {
            debug!("关闭管理器已经触发过关闭");
            return;
        }
        *is_shutdown = true;

        let mut shutdown_tx = self.shutdown_tx.write().await;
        if let Some(tx) = shutdown_tx.take() {
            debug!("发送关闭信号给 {} 个订阅者", tx.receiver_count());
            let _ = tx.send(());
        }

        info!("关闭信号已发送");
    }

    pub async fn is_shutdown(&self) -> bool {
        *self.is_shutdown.read().await
    }
}

/// 等待关闭信号或代理任务自行结束
///
/// 代理在收到信号前退出（例如启动时注册失败）视为致命错误，返回 Err 让进程退出；
/// 收到信号后广播关闭，并在 `grace` 内等待代理停止。
pub async fn supervise<S>(
    mut agent: JoinHandle<Result<()>>,
    signal: S,
    shutdown_manager: &ShutdownManager,
    grace: Duration,
) -> Result<()>
where
    S: Future<Output = ()>,
{
    tokio::select! {
        joined = &mut agent => {
            return match joined {
                Ok(Ok(())) => Err(anyhow!("代理在收到关闭信号前意外退出")),
                Ok(Err(e)) => Err(e.context("代理运行失败")),
                Err(e) => Err(anyhow!("代理任务异常终止: {e}")),
            };
        }
        _ = signal => {
            info!("收到关闭信号，开始优雅关闭...");
        }
    }

    shutdown_manager.shutdown().await;

    match tokio::time::timeout(grace, agent).await {
        Ok(Ok(Ok(()))) => {
            info!("代理已优雅关闭");
            Ok(())
        }
        Ok(Ok(Err(e))) => Err(e.context("代理关闭时发生错误")),
        Ok(Err(e)) => Err(anyhow!("代理任务异常终止: {e}")),
        Err(_) => {
            warn!("代理关闭超时，强制退出");
            Ok(())
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
