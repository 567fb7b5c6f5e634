// ==========================================
// 设备综合效率系统 - 停机台账
// ==========================================
// 对齐: downtime 表
// 约束:
// - 同一设备最多一条未结束停机 (open_in 校验, 状态机加锁保证)
// - 关闭操作幂等: 无未结束停机时为空操作, 不修改已关闭条目
// ==========================================

use crate::db::fmt_ts;
use crate::domain::ledger::{DowntimeEntry, NewDowntime};
use crate::domain::types::DowntimeCategory;
use crate::repository::error::{ensure_not_before, RepositoryError, RepositoryResult};
use crate::repository::row_utils::{category_column, opt_ts_column, ts_column};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const DOWNTIME_COLUMNS: &str = r#"
    d.downtime_id, d.machine_id, d.reason, d.description, d.category,
    d.started_at, d.ended_at, d.duration, d.is_planned
"#;

/// 分类聚合行
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryAggregateRow {
    pub category: DowntimeCategory,
    pub count: i64,
    pub total_duration: i64,
    pub avg_duration: f64,
    pub min_duration: i64,
    pub max_duration: i64,
}

/// 帕累托聚合行 (原因 + 分类)
#[derive(Debug, Clone, PartialEq)]
pub struct ParetoRow {
    pub reason: String,
    pub category: DowntimeCategory,
    pub frequency: i64,
    pub total_duration: i64,
    pub avg_duration: f64,
}

/// 未结束停机 + 设备/产线名称
#[derive(Debug, Clone, PartialEq)]
pub struct OpenDowntimeRow {
    pub entry: DowntimeEntry,
    pub machine_name: String,
    pub line_name: String,
}

/// 已关闭停机的 (合计时长, 条数)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DurationStats {
    pub total_duration: i64,
    pub count: i64,
}

// ==========================================
// DowntimeRepository - 停机台账仓储
// ==========================================
pub struct DowntimeRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DowntimeRepository {
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

    /// 设备当前未结束停机 (按 started_at 取最新)
    pub fn find_open_in(conn: &Connection, machine_id: i64) -> RepositoryResult<Option<DowntimeEntry>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM downtime d
            WHERE d.machine_id = ?1 AND d.ended_at IS NULL
            ORDER BY d.started_at DESC, d.downtime_id DESC
            LIMIT 1
            "#,
            DOWNTIME_COLUMNS
        );
        let entry = conn.query_row(&sql, params![machine_id], map_row).optional()?;
        Ok(entry)
    }

    /// 开启停机
    ///
    /// # 错误
    /// - `OpenDowntimeExists`: 设备已有未结束停机
    pub fn open_in(
        conn: &Connection,
        machine_id: i64,
        downtime: &NewDowntime,
        now: NaiveDateTime,
    ) -> RepositoryResult<DowntimeEntry> {
        if let Some(existing) = Self::find_open_in(conn, machine_id)? {
            return Err(RepositoryError::OpenDowntimeExists {
                machine_id,
                downtime_id: existing.downtime_id,
            });
        }

        conn.execute(
            r#"
            INSERT INTO downtime (
                machine_id, reason, description, category,
                started_at, ended_at, duration, is_planned
            ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6)
            "#,
            params![
                machine_id,
                downtime.reason,
                downtime.description,
                downtime.category.as_str(),
                fmt_ts(now),
                downtime.is_planned,
            ],
        )?;

        Ok(DowntimeEntry {
            downtime_id: conn.last_insert_rowid(),
            machine_id,
            reason: downtime.reason.clone(),
            description: downtime.description.clone(),
            category: downtime.category,
            started_at: now,
            ended_at: None,
            duration: None,
            is_planned: downtime.is_planned,
        })
    }

    /// 关闭未结束停机; 无则返回 None
    pub fn close_in(
        conn: &Connection,
        machine_id: i64,
        now: NaiveDateTime,
    ) -> RepositoryResult<Option<DowntimeEntry>> {
        let open = match Self::find_open_in(conn, machine_id)? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let duration = ensure_not_before(machine_id, open.started_at, now)?;
        conn.execute(
            "UPDATE downtime SET ended_at = ?1, duration = ?2 WHERE downtime_id = ?3 AND ended_at IS NULL",
            params![fmt_ts(now), duration, open.downtime_id],
        )?;

        Ok(Some(DowntimeEntry {
            ended_at: Some(now),
            duration: Some(duration),
            ..open
        }))
    }

    // ==========================================
    // 写入操作 (独立事务)
    // ==========================================

    pub fn open_downtime(
        &self,
        machine_id: i64,
        downtime: &NewDowntime,
        now: NaiveDateTime,
    ) -> RepositoryResult<DowntimeEntry> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let entry = Self::open_in(&tx, machine_id, downtime, now)?;
        tx.commit()?;
        Ok(entry)
    }

    pub fn close_downtime(&self, machine_id: i64, now: NaiveDateTime) -> RepositoryResult<Option<DowntimeEntry>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let closed = Self::close_in(&tx, machine_id, now)?;
        tx.commit()?;
        Ok(closed)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_open(&self, machine_id: i64) -> RepositoryResult<Option<DowntimeEntry>> {
        let conn = self.get_conn()?;
        Self::find_open_in(&conn, machine_id)
    }

    pub fn find_by_id(&self, downtime_id: i64) -> RepositoryResult<Option<DowntimeEntry>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM downtime d WHERE d.downtime_id = ?1", DOWNTIME_COLUMNS);
        let entry = conn.query_row(&sql, params![downtime_id], map_row).optional()?;
        Ok(entry)
    }

    /// 设备全部停机 (按插入顺序)
    pub fn list_by_machine(&self, machine_id: i64) -> RepositoryResult<Vec<DowntimeEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM downtime d WHERE d.machine_id = ?1 ORDER BY d.started_at ASC, d.downtime_id ASC",
            DOWNTIME_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![machine_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// 窗口内开始的停机时长合计 (秒)
    ///
    /// - `unplanned_only = true`: 只统计非计划停机
    pub fn total_in_window(
        &self,
        machine_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
        unplanned_only: bool,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT COALESCE(SUM(duration), 0)
            FROM downtime
            WHERE machine_id = ?1
              AND started_at BETWEEN ?2 AND ?3
              {}
            "#,
            if unplanned_only { "AND is_planned = 0" } else { "" }
        );
        let total: i64 = conn.query_row(&sql, params![machine_id, fmt_ts(start), fmt_ts(end)], |row| {
            row.get(0)
        })?;
        Ok(total)
    }

    /// 窗口内非计划停机时长合计 (秒)
    pub fn unplanned_total_in_window(
        &self,
        machine_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        self.total_in_window(machine_id, start, end, true)
    }

    /// 窗口内开始的非计划停机次数 (含未结束)
    pub fn unplanned_count_in_window(
        &self,
        machine_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM downtime
            WHERE machine_id = ?1
              AND is_planned = 0
              AND started_at BETWEEN ?2 AND ?3
            "#,
            params![machine_id, fmt_ts(start), fmt_ts(end)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 窗口内已关闭非计划停机的 (合计时长, 条数)
    pub fn closed_unplanned_stats(
        &self,
        machine_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> RepositoryResult<DurationStats> {
        let conn = self.get_conn()?;
        let stats = conn.query_row(
            r#"
            SELECT COALESCE(SUM(duration), 0), COUNT(*)
            FROM downtime
            WHERE machine_id = ?1
              AND is_planned = 0
              AND ended_at IS NOT NULL
              AND started_at BETWEEN ?2 AND ?3
            "#,
            params![machine_id, fmt_ts(start), fmt_ts(end)],
            |row| {
                Ok(DurationStats {
                    total_duration: row.get(0)?,
                    count: row.get(1)?,
                })
            },
        )?;
        Ok(stats)
    }

    /// 按分类聚合 since 之后开始且已关闭的停机
    ///
    /// 排序: total_duration 降序, 同值按首条插入顺序
    pub fn category_aggregate(
        &self,
        line_id: Option<i64>,
        since: NaiveDateTime,
    ) -> RepositoryResult<Vec<CategoryAggregateRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT d.category,
                   COUNT(*),
                   COALESCE(SUM(d.duration), 0) AS total_duration,
                   COALESCE(AVG(d.duration), 0.0),
                   COALESCE(MIN(d.duration), 0),
                   COALESCE(MAX(d.duration), 0)
            FROM downtime d
            JOIN machine m ON m.machine_id = d.machine_id
            WHERE d.started_at >= ?1
              AND d.ended_at IS NOT NULL
              AND (?2 IS NULL OR m.production_line_id = ?2)
            GROUP BY d.category
            ORDER BY total_duration DESC, MIN(d.downtime_id) ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![fmt_ts(since), line_id], |row| {
                Ok(CategoryAggregateRow {
                    category: category_column(row, 0)?,
                    count: row.get(1)?,
                    total_duration: row.get(2)?,
                    avg_duration: row.get(3)?,
                    min_duration: row.get(4)?,
                    max_duration: row.get(5)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 帕累托聚合: 按 (原因, 分类) 分组, 取时长最大的前 limit 组
    pub fn pareto_rows(
        &self,
        line_id: Option<i64>,
        since: NaiveDateTime,
        limit: usize,
    ) -> RepositoryResult<Vec<ParetoRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT d.reason,
                   d.category,
                   COUNT(*),
                   COALESCE(SUM(d.duration), 0) AS total_duration,
                   COALESCE(AVG(d.duration), 0.0)
            FROM downtime d
            JOIN machine m ON m.machine_id = d.machine_id
            WHERE d.started_at >= ?1
              AND d.ended_at IS NOT NULL
              AND (?2 IS NULL OR m.production_line_id = ?2)
            GROUP BY d.reason, d.category
            ORDER BY total_duration DESC, MIN(d.downtime_id) ASC
            LIMIT ?3
            "#,
        )?;
        let rows = stmt
            .query_map(params![fmt_ts(since), line_id, limit as i64], |row| {
                Ok(ParetoRow {
                    reason: row.get(0)?,
                    category: category_column(row, 1)?,
                    frequency: row.get(2)?,
                    total_duration: row.get(3)?,
                    avg_duration: row.get(4)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 全部未结束停机 (可按产线过滤)
    pub fn list_open(&self, line_id: Option<i64>) -> RepositoryResult<Vec<OpenDowntimeRow>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {}, m.name, l.name
            FROM downtime d
            JOIN machine m ON m.machine_id = d.machine_id
            JOIN production_line l ON l.line_id = m.production_line_id
            WHERE d.ended_at IS NULL
              AND (?1 IS NULL OR m.production_line_id = ?1)
            ORDER BY d.started_at ASC, d.downtime_id ASC
            "#,
            DOWNTIME_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![line_id], |row| {
                Ok(OpenDowntimeRow {
                    entry: map_row(row)?,
                    machine_name: row.get(9)?,
                    line_name: row.get(10)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 窗口内开始且已关闭的停机 (按开始时间倒序)
    pub fn history(
        &self,
        line_id: Option<i64>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> RepositoryResult<Vec<DowntimeEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {}
            FROM downtime d
            JOIN machine m ON m.machine_id = d.machine_id
            WHERE d.ended_at IS NOT NULL
              AND d.started_at BETWEEN ?1 AND ?2
              AND (?3 IS NULL OR m.production_line_id = ?3)
            ORDER BY d.started_at DESC, d.downtime_id DESC
            "#,
            DOWNTIME_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![fmt_ts(start), fmt_ts(end), line_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }
}

fn map_row(row: &Row) -> SqliteResult<DowntimeEntry> {
    Ok(DowntimeEntry {
        downtime_id: row.get(0)?,
        machine_id: row.get(1)?,
        reason: row.get(2)?,
        description: row.get(3)?,
        category: category_column(row, 4)?,
        started_at: ts_column(row, 5)?,
        ended_at: opt_ts_column(row, 6)?,
        duration: row.get(7)?,
        is_planned: row.get(8)?,
    })
}
