// ==========================================
// 设备综合效率系统 - 设备状态台账
// ==========================================
// 对齐: machine_status_log 表
// 约束:
// - 同一设备最多一条 ended_at 为空的条目
// - 新条目 started_at = 上一条 ended_at (无缝衔接, 无重叠)
// - 只追加, 已关闭条目不再修改
// ==========================================

use crate::db::fmt_ts;
use crate::domain::ledger::StatusLogEntry;
use crate::domain::types::MachineStatus;
use crate::repository::error::{ensure_not_before, RepositoryError, RepositoryResult};
use crate::repository::row_utils::{opt_ts_column, status_column, ts_column};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const LOG_COLUMNS: &str = "log_id, machine_id, status, started_at, ended_at, duration";

/// 按状态聚合的区间统计
#[derive(Debug, Clone, PartialEq)]
pub struct StatusDurationRow {
    pub status: MachineStatus,
    pub count: i64,
    pub total_duration: i64,
    pub avg_duration: f64,
}

// ==========================================
// StatusLogRepository - 状态台账仓储
// ==========================================
pub struct StatusLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StatusLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 查询设备当前未结束条目
    pub fn find_open_in(conn: &Connection, machine_id: i64) -> RepositoryResult<Option<StatusLogEntry>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM machine_status_log
            WHERE machine_id = ?1 AND ended_at IS NULL
            ORDER BY started_at DESC, log_id DESC
            LIMIT 1
            "#,
            LOG_COLUMNS
        );
        let entry = conn.query_row(&sql, params![machine_id], map_row).optional()?;
        Ok(entry)
    }

    /// 追加状态变更
    ///
    /// 1. 关闭当前未结束条目 (ended_at = now, duration = now - started_at); 无则跳过
    /// 2. 插入新的未结束条目 {status, started_at: now}
    ///
    /// # 返回
    /// (被关闭的条目, 新条目)
    pub fn append_status_change_in(
        conn: &Connection,
        machine_id: i64,
        status: MachineStatus,
        now: NaiveDateTime,
    ) -> RepositoryResult<(Option<StatusLogEntry>, StatusLogEntry)> {
        let closed = match Self::find_open_in(conn, machine_id)? {
            Some(open) => {
                let duration = ensure_not_before(machine_id, open.started_at, now)?;
                conn.execute(
                    "UPDATE machine_status_log SET ended_at = ?1, duration = ?2 WHERE log_id = ?3",
                    params![fmt_ts(now), duration, open.log_id],
                )?;
                Some(StatusLogEntry {
                    ended_at: Some(now),
                    duration: Some(duration),
                    ..open
                })
            }
            None => None,
        };

        conn.execute(
            r#"
            INSERT INTO machine_status_log (machine_id, status, started_at, ended_at, duration)
            VALUES (?1, ?2, ?3, NULL, NULL)
            "#,
            params![machine_id, status.as_str(), fmt_ts(now)],
        )?;

        let opened = StatusLogEntry {
            log_id: conn.last_insert_rowid(),
            machine_id,
            status,
            started_at: now,
            ended_at: None,
            duration: None,
        };
        Ok((closed, opened))
    }

    // ==========================================
    // 写入操作 (独立事务)
    // ==========================================

    /// 追加状态变更 (自带事务)
    ///
    /// 说明: 只维护台账本身; 设备缓存状态/产线状态/停机台账由状态机统一处理
    pub fn append_status_change(
        &self,
        machine_id: i64,
        status: MachineStatus,
        now: NaiveDateTime,
    ) -> RepositoryResult<(Option<StatusLogEntry>, StatusLogEntry)> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let result = Self::append_status_change_in(&tx, machine_id, status, now)?;
        tx.commit()?;
        Ok(result)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_open(&self, machine_id: i64) -> RepositoryResult<Option<StatusLogEntry>> {
        let conn = self.get_conn()?;
        Self::find_open_in(&conn, machine_id)
    }

    /// 当前状态已持续秒数, 无未结束条目时为 0
    pub fn current_status_duration(&self, machine_id: i64, now: NaiveDateTime) -> RepositoryResult<i64> {
        Ok(self
            .find_open(machine_id)?
            .map(|entry| entry.elapsed_seconds(now))
            .unwrap_or(0))
    }

    /// 窗口内指定状态的运行时长 (秒)
    ///
    /// 计入条件:
    /// - started_at BETWEEN start AND end, 或
    /// - started_at < start 且 (未结束 或 ended_at > end)
    ///
    /// 注意: 跨窗口边界的条目按全部记录时长计入, 不做裁剪;
    ///       未结束条目 duration 为空, 计 0。这是已知近似, 所有 OEE 输出依赖该口径。
    pub fn run_time(
        &self,
        machine_id: i64,
        status: MachineStatus,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let total: i64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(duration), 0)
            FROM machine_status_log
            WHERE machine_id = ?1
              AND status = ?2
              AND (
                started_at BETWEEN ?3 AND ?4
                OR (started_at < ?3 AND (ended_at IS NULL OR ended_at > ?4))
              )
            "#,
            params![machine_id, status.as_str(), fmt_ts(start), fmt_ts(end)],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// 窗口内开始的指定状态条目的时长合计 (秒), 不含跨边界条目
    pub fn duration_started_in(
        &self,
        machine_id: i64,
        status: MachineStatus,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let total: i64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(duration), 0)
            FROM machine_status_log
            WHERE machine_id = ?1
              AND status = ?2
              AND started_at BETWEEN ?3 AND ?4
            "#,
            params![machine_id, status.as_str(), fmt_ts(start), fmt_ts(end)],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// 设备全部条目 (按时间正序)
    pub fn list_by_machine(&self, machine_id: i64) -> RepositoryResult<Vec<StatusLogEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM machine_status_log WHERE machine_id = ?1 ORDER BY started_at ASC, log_id ASC",
            LOG_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![machine_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// since 之后开始的条目 (按时间倒序)
    pub fn history_since(&self, machine_id: i64, since: NaiveDateTime) -> RepositoryResult<Vec<StatusLogEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {}
            FROM machine_status_log
            WHERE machine_id = ?1 AND started_at >= ?2
            ORDER BY started_at DESC, log_id DESC
            "#,
            LOG_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![machine_id, fmt_ts(since)], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// 产线在 since 之后开始的条目, 按状态聚合
    pub fn status_durations_for_line(
        &self,
        line_id: i64,
        since: NaiveDateTime,
    ) -> RepositoryResult<Vec<StatusDurationRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT l.status,
                   COUNT(*) AS cnt,
                   COALESCE(SUM(l.duration), 0) AS total_duration,
                   COALESCE(AVG(l.duration), 0.0) AS avg_duration
            FROM machine_status_log l
            JOIN machine m ON m.machine_id = l.machine_id
            WHERE m.production_line_id = ?1
              AND l.started_at >= ?2
            GROUP BY l.status
            ORDER BY MIN(l.log_id)
            "#,
        )?;
        let rows = stmt
            .query_map(params![line_id, fmt_ts(since)], |row| {
                Ok(StatusDurationRow {
                    status: status_column(row, 0)?,
                    count: row.get(1)?,
                    total_duration: row.get(2)?,
                    avg_duration: row.get(3)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}

fn map_row(row: &Row) -> SqliteResult<StatusLogEntry> {
    Ok(StatusLogEntry {
        log_id: row.get(0)?,
        machine_id: row.get(1)?,
        status: status_column(row, 2)?,
        started_at: ts_column(row, 3)?,
        ended_at: opt_ts_column(row, 4)?,
        duration: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn setup_test_db() -> (Arc<Mutex<Connection>>, i64) {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO production_line (name, code, status, created_at) VALUES ('L1', 'L1', 'stopped', '2025-01-01 00:00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO machine (production_line_id, name, code, status, ideal_cycle_time, created_at) VALUES (1, 'M1', 'M1', 'idle', 60, '2025-01-01 00:00:00')",
            [],
        )
        .unwrap();
        (Arc::new(Mutex::new(conn)), 1)
    }

    #[test]
    fn test_append_closes_previous_and_keeps_contiguity() {
        let (conn, machine_id) = setup_test_db();
        let repo = StatusLogRepository::new(conn);

        let (closed, first) = repo
            .append_status_change(machine_id, MachineStatus::Idle, dt("2025-01-01 08:00:00"))
            .unwrap();
        assert!(closed.is_none());
        assert!(first.is_open());

        let (closed, _) = repo
            .append_status_change(machine_id, MachineStatus::Running, dt("2025-01-01 08:30:00"))
            .unwrap();
        let closed = closed.unwrap();
        assert_eq!(closed.log_id, first.log_id);
        assert_eq!(closed.duration, Some(1800));

        let entries = repo.list_by_machine(machine_id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.iter().filter(|e| e.is_open()).count(), 1);
        assert_eq!(entries[0].ended_at, Some(entries[1].started_at));
    }

    #[test]
    fn test_current_status_duration() {
        let (conn, machine_id) = setup_test_db();
        let repo = StatusLogRepository::new(conn);

        assert_eq!(repo.current_status_duration(machine_id, dt("2025-01-01 09:00:00")).unwrap(), 0);

        repo.append_status_change(machine_id, MachineStatus::Running, dt("2025-01-01 08:00:00"))
            .unwrap();
        assert_eq!(
            repo.current_status_duration(machine_id, dt("2025-01-01 08:15:30")).unwrap(),
            930
        );
    }

    #[test]
    fn test_run_time_counts_straddling_entries_in_full() {
        let (conn, machine_id) = setup_test_db();
        let repo = StatusLogRepository::new(conn);

        // 07:00-09:00 running (跨窗口起点), 09:00-10:00 idle, 10:00-13:00 running (跨窗口终点)
        repo.append_status_change(machine_id, MachineStatus::Running, dt("2025-01-01 07:00:00")).unwrap();
        repo.append_status_change(machine_id, MachineStatus::Idle, dt("2025-01-01 09:00:00")).unwrap();
        repo.append_status_change(machine_id, MachineStatus::Running, dt("2025-01-01 10:00:00")).unwrap();
        repo.append_status_change(machine_id, MachineStatus::Idle, dt("2025-01-01 13:00:00")).unwrap();

        let run = repo
            .run_time(machine_id, MachineStatus::Running, dt("2025-01-01 08:00:00"), dt("2025-01-01 12:00:00"))
            .unwrap();
        // 起点前开始且在窗口内结束的条目不满足任一条件; 10:00 条目整段 3h 计入
        assert_eq!(run, 3 * 3600);

        let run_wide = repo
            .run_time(machine_id, MachineStatus::Running, dt("2025-01-01 06:00:00"), dt("2025-01-01 12:00:00"))
            .unwrap();
        assert_eq!(run_wide, 5 * 3600);
    }

    #[test]
    fn test_run_time_open_entry_contributes_zero() {
        let (conn, machine_id) = setup_test_db();
        let repo = StatusLogRepository::new(conn);

        repo.append_status_change(machine_id, MachineStatus::Running, dt("2025-01-01 07:00:00")).unwrap();
        let run = repo
            .run_time(machine_id, MachineStatus::Running, dt("2025-01-01 08:00:00"), dt("2025-01-01 12:00:00"))
            .unwrap();
        assert_eq!(run, 0);
    }

    #[test]
    fn test_history_since_is_newest_first() {
        let (conn, machine_id) = setup_test_db();
        let repo = StatusLogRepository::new(conn);

        repo.append_status_change(machine_id, MachineStatus::Idle, dt("2025-01-01 06:00:00")).unwrap();
        repo.append_status_change(machine_id, MachineStatus::Running, dt("2025-01-01 08:00:00")).unwrap();
        repo.append_status_change(machine_id, MachineStatus::Idle, dt("2025-01-01 09:00:00")).unwrap();

        let history = repo.history_since(machine_id, dt("2025-01-01 07:00:00")).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, MachineStatus::Idle);
        assert_eq!(history[1].status, MachineStatus::Running);
    }
}
