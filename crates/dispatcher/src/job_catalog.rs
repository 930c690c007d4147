use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use fleetcron_core::{JobDefinition, JobRepository, SchedulerResult, Tick};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// 判断任务在某一时刻（按配置时区的本地时间）是否到期
pub fn is_due_at(job: &JobDefinition, tick_time: DateTime<Utc>, timezone: Tz) -> bool {
    let tick = Tick::at(tick_time, timezone);
    job.is_due_at_local(tick.hour(), tick.minute())
}

/// 某一次加载得到的完整任务集合，加载后不再修改
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub version: u64,
    pub jobs: Vec<JobDefinition>,
    /// 本次加载中因定义无效被跳过的任务
    pub skipped: Vec<String>,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl CatalogSnapshot {
    pub fn due_at(&self, tick: &Tick) -> Vec<JobDefinition> {
        self.jobs
            .iter()
            .filter(|job| job.is_due_at_local(tick.hour(), tick.minute()))
            .cloned()
            .collect()
    }

    pub fn get(&self, job_id: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|job| job.job_id == job_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// 任务目录：从共享存储加载任务定义，整体替换当前快照
///
/// 读者拿到的始终是某一次加载的完整快照，不会看到新旧混合的状态。
pub struct JobCatalog {
    job_repo: Arc<dyn JobRepository>,
    current: RwLock<Arc<CatalogSnapshot>>,
    reload_lock: Mutex<u64>,
}

impl JobCatalog {
    pub fn new(job_repo: Arc<dyn JobRepository>) -> Self {
        Self {
            job_repo,
            current: RwLock::new(Arc::new(CatalogSnapshot::default())),
            reload_lock: Mutex::new(0),
        }
    }

    /// 当前快照
    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.read().await.clone()
    }

    /// 重新加载全部任务
    ///
    /// 读取失败时保留上一个快照并返回错误；单个无效定义只会被跳过。
    pub async fn load_jobs(&self) -> SchedulerResult<Arc<CatalogSnapshot>> {
        let mut version = self.reload_lock.lock().await;

        let stored = self.job_repo.list_all().await?;
        let mut jobs = Vec::with_capacity(stored.len());
        let mut skipped = Vec::new();
        for item in &stored {
            match item.parse() {
                Ok(job) if job.enabled => jobs.push(job),
                Ok(job) => debug!("任务已禁用，跳过: {}", job.job_id),
                Err(e) => {
                    warn!("任务定义无效，跳过 {}: {e}", item.job_id);
                    skipped.push(item.job_id.clone());
                }
            }
        }
        jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));

        *version += 1;
        let snapshot = Arc::new(CatalogSnapshot {
            version: *version,
            jobs,
            skipped,
            loaded_at: Some(Utc::now()),
        });
        *self.current.write().await = snapshot.clone();

        info!(
            "任务目录已加载: version={}, 有效任务={}, 跳过={}",
            snapshot.version,
            snapshot.jobs.len(),
            snapshot.skipped.len()
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fleetcron_core::StoredJob;
    use fleetcron_testing_utils::{JobDefinitionBuilder, MockJobRepository};
    use serde_json::json;

    #[test]
    fn due_check_uses_configured_timezone() {
        let job = JobDefinitionBuilder::new("report").at(9, 0).build();
        // 00:00 UTC = 09:00 Asia/Seoul
        let instant = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 40).unwrap();
        assert!(is_due_at(&job, instant, chrono_tz::Asia::Seoul));
        assert!(!is_due_at(&job, instant, chrono_tz::UTC));
    }

    #[test]
    fn hourly_entry_is_due_every_hour() {
        let job = JobDefinitionBuilder::new("sync").every_hour_at(0).build();
        for hour in 0..24 {
            let instant = Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap();
            assert!(is_due_at(&job, instant, chrono_tz::UTC));
        }
        let off = Utc.with_ymd_and_hms(2026, 3, 2, 5, 1, 0).unwrap();
        assert!(!is_due_at(&job, off, chrono_tz::UTC));
    }

    #[test]
    fn disabled_job_is_never_due() {
        let job = JobDefinitionBuilder::new("off").at(9, 0).disabled().build();
        let instant = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        assert!(!is_due_at(&job, instant, chrono_tz::UTC));
    }

    #[tokio::test]
    async fn load_skips_invalid_and_disabled_jobs() {
        let repo = MockJobRepository::with_jobs(vec![
            JobDefinitionBuilder::new("ok").at(1, 0).stored(),
            JobDefinitionBuilder::new("off").at(1, 0).disabled().stored(),
            StoredJob {
                job_id: "broken".to_string(),
                document: json!({"hour": 3, "minute": 99, "url": "http://x"}),
            },
        ]);
        let catalog = JobCatalog::new(Arc::new(repo));

        let snapshot = catalog.load_jobs().await.unwrap();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("ok").is_some());
        assert_eq!(snapshot.skipped, vec!["broken".to_string()]);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_snapshot() {
        let repo = MockJobRepository::with_jobs(vec![JobDefinitionBuilder::new("a").at(1, 0).stored()]);
        let catalog = JobCatalog::new(Arc::new(repo.clone()));
        catalog.load_jobs().await.unwrap();

        repo.set_unavailable(true);
        assert!(catalog.load_jobs().await.is_err());

        let snapshot = catalog.snapshot().await;
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn reload_replaces_whole_generation() {
        let repo = MockJobRepository::with_jobs(vec![
            JobDefinitionBuilder::new("a").at(1, 0).stored(),
            JobDefinitionBuilder::new("b").at(1, 0).stored(),
        ]);
        let catalog = Arc::new(JobCatalog::new(Arc::new(repo.clone())));
        catalog.load_jobs().await.unwrap();
        let old = catalog.snapshot().await;

        repo.remove("a");
        repo.put(JobDefinitionBuilder::new("c").at(2, 0).stored());

        let mut readers = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let catalog = catalog.clone();
            readers.spawn(async move {
                let snapshot = catalog.snapshot().await;
                snapshot
                    .jobs
                    .iter()
                    .map(|j| j.job_id.clone())
                    .collect::<Vec<_>>()
            });
        }
        catalog.load_jobs().await.unwrap();

        while let Some(ids) = readers.join_next().await {
            let ids = ids.unwrap();
            assert!(
                ids == vec!["a".to_string(), "b".to_string()]
                    || ids == vec!["b".to_string(), "c".to_string()],
                "读到了混合的快照: {ids:?}"
            );
        }

        // 旧快照持有者不受影响
        assert_eq!(old.len(), 2);
        assert!(old.get("a").is_some());
        let new = catalog.snapshot().await;
        assert_eq!(new.version, 2);
        assert!(new.get("c").is_some());
    }

    #[tokio::test]
    async fn due_at_filters_snapshot() {
        let repo = MockJobRepository::with_jobs(vec![
            JobDefinitionBuilder::new("nine").at(9, 0).stored(),
            JobDefinitionBuilder::new("hourly").every_hour_at(0).stored(),
            JobDefinitionBuilder::new("ten").at(10, 30).stored(),
        ]);
        let catalog = JobCatalog::new(Arc::new(repo));
        let snapshot = catalog.load_jobs().await.unwrap();

        let tick = Tick::at(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
            chrono_tz::UTC,
        );
        let due: Vec<String> = snapshot.due_at(&tick).into_iter().map(|j| j.job_id).collect();
        assert_eq!(due, vec!["hourly".to_string(), "nine".to_string()]);
    }
}
