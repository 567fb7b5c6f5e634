// ==========================================
// 设备综合效率系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为 (外键 / busy_timeout)
// - 统一建表 (幂等), 台账索引保证"未结束条目"查询走索引
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::path::PathBuf;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// 时间戳存储格式 (字典序 = 时间序)
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化全部表结构 (幂等)
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS production_line (
            line_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'stopped',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS machine (
            machine_id INTEGER PRIMARY KEY AUTOINCREMENT,
            production_line_id INTEGER NOT NULL REFERENCES production_line(line_id),
            name TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'idle',
            ideal_cycle_time REAL NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_machine_line
          ON machine(production_line_id);

        CREATE TABLE IF NOT EXISTS machine_status_log (
            log_id INTEGER PRIMARY KEY AUTOINCREMENT,
            machine_id INTEGER NOT NULL REFERENCES machine(machine_id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            duration INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_status_log_open
          ON machine_status_log(machine_id, ended_at);
        CREATE INDEX IF NOT EXISTS idx_status_log_started
          ON machine_status_log(machine_id, started_at);

        CREATE TABLE IF NOT EXISTS downtime (
            downtime_id INTEGER PRIMARY KEY AUTOINCREMENT,
            machine_id INTEGER NOT NULL REFERENCES machine(machine_id) ON DELETE CASCADE,
            reason TEXT NOT NULL,
            description TEXT,
            category TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            duration INTEGER,
            is_planned INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_downtime_open
          ON downtime(machine_id, ended_at);
        CREATE INDEX IF NOT EXISTS idx_downtime_started
          ON downtime(machine_id, started_at);

        CREATE TABLE IF NOT EXISTS production_schedule (
            schedule_id INTEGER PRIMARY KEY AUTOINCREMENT,
            production_line_id INTEGER NOT NULL REFERENCES production_line(line_id),
            product_name TEXT NOT NULL,
            product_code TEXT NOT NULL,
            planned_quantity INTEGER NOT NULL CHECK (planned_quantity >= 1),
            actual_quantity INTEGER NOT NULL DEFAULT 0 CHECK (actual_quantity >= 0),
            scheduled_start TEXT NOT NULL,
            scheduled_end TEXT NOT NULL,
            actual_start TEXT,
            actual_end TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            shift TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_schedule_line_start
          ON production_schedule(production_line_id, scheduled_start);
        CREATE INDEX IF NOT EXISTS idx_schedule_status
          ON production_schedule(status, scheduled_end);

        CREATE TABLE IF NOT EXISTS production_output (
            output_id INTEGER PRIMARY KEY AUTOINCREMENT,
            machine_id INTEGER NOT NULL REFERENCES machine(machine_id) ON DELETE CASCADE,
            production_schedule_id INTEGER REFERENCES production_schedule(schedule_id),
            quantity_produced INTEGER NOT NULL CHECK (quantity_produced >= 1),
            quantity_rejected INTEGER NOT NULL DEFAULT 0 CHECK (quantity_rejected >= 0),
            cycle_time REAL,
            recorded_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_output_recorded
          ON production_output(machine_id, recorded_at);
        CREATE INDEX IF NOT EXISTS idx_output_schedule
          ON production_output(production_schedule_id);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 默认数据库路径
///
/// 优先级: 环境变量 EQUIPMENT_OEE_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var("EQUIPMENT_OEE_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./equipment_oee.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("equipment-oee");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("equipment_oee.db");
        }
    }
    path.to_string_lossy().to_string()
}

/// 时间戳 → 存储字符串
pub fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// 存储字符串 → 时间戳 (供 row 映射使用, 解析失败转为 rusqlite 转换错误)
pub fn parse_ts(raw: &str, column: usize) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_default_db_path() {
        let path = get_default_db_path();
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_ts_round_trip() {
        let ts = NaiveDateTime::parse_from_str("2025-06-01 07:08:09", TS_FORMAT).unwrap();
        assert_eq!(parse_ts(&fmt_ts(ts), 0).unwrap(), ts);
        assert!(parse_ts("not a time", 3).is_err());
    }
}
