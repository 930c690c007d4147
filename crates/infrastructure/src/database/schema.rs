//! 建表语句，启动时幂等执行
//!
//! `job_runs (job_id, scheduled_for, claim_scope)` 上的唯一索引是全舰队互斥的基础。

pub const POSTGRES_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS machines (
        machine_id TEXT PRIMARY KEY,
        hostname TEXT NOT NULL DEFAULT '',
        machine_order INTEGER NOT NULL,
        serial INTEGER NOT NULL,
        last_seen TIMESTAMPTZ NOT NULL,
        status TEXT NOT NULL DEFAULT 'online',
        registered_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        job_id TEXT PRIMARY KEY,
        document JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_runs (
        id BIGSERIAL PRIMARY KEY,
        job_id TEXT NOT NULL,
        scheduled_for TIMESTAMPTZ NOT NULL,
        claim_scope TEXT NOT NULL,
        machine_id TEXT NOT NULL,
        status TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        started_at TIMESTAMPTZ,
        finished_at TIMESTAMPTZ,
        error_detail TEXT,
        steps JSONB NOT NULL DEFAULT '[]'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_job_runs_claim
        ON job_runs (job_id, scheduled_for, claim_scope)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS commands (
        id UUID PRIMARY KEY,
        command_type TEXT NOT NULL,
        target TEXT NOT NULL DEFAULT 'all',
        issued_at TIMESTAMPTZ NOT NULL,
        payload JSONB
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS command_consumptions (
        command_id UUID NOT NULL REFERENCES commands (id),
        machine_id TEXT NOT NULL,
        consumed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (command_id, machine_id)
    )
    "#,
];

pub const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS machines (
        machine_id TEXT PRIMARY KEY,
        hostname TEXT NOT NULL DEFAULT '',
        machine_order INTEGER NOT NULL,
        serial INTEGER NOT NULL,
        last_seen TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'online',
        registered_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        job_id TEXT PRIMARY KEY,
        document TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id TEXT NOT NULL,
        scheduled_for TEXT NOT NULL,
        claim_scope TEXT NOT NULL,
        machine_id TEXT NOT NULL,
        status TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        started_at TEXT,
        finished_at TEXT,
        error_detail TEXT,
        steps TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_job_runs_claim
        ON job_runs (job_id, scheduled_for, claim_scope)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS commands (
        id TEXT PRIMARY KEY,
        command_type TEXT NOT NULL,
        target TEXT NOT NULL DEFAULT 'all',
        issued_at TEXT NOT NULL,
        payload TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS command_consumptions (
        command_id TEXT NOT NULL REFERENCES commands (id),
        machine_id TEXT NOT NULL,
        consumed_at TEXT NOT NULL,
        PRIMARY KEY (command_id, machine_id)
    )
    "#,
];
