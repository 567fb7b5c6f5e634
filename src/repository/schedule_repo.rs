// ==========================================
// 设备综合效率系统 - 排产计划仓储
// ==========================================
// 对齐: production_schedule 表
// 约束: 状态流转校验在引擎层完成; 进度写入提供 *_in(conn) 版本
// ==========================================

use crate::db::fmt_ts;
use crate::domain::schedule::{
    DailyPlanActual, NewProductionSchedule, ProductionSchedule, ScheduleFilter, ScheduleStatus,
};
use crate::domain::shift::Shift;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{
    opt_shift_column, opt_ts_column, schedule_status_column, shift_column, ts_column,
};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const SCHEDULE_COLUMNS: &str = "s.schedule_id, s.production_line_id, s.product_name, s.product_code, \
     s.planned_quantity, s.actual_quantity, s.scheduled_start, s.scheduled_end, \
     s.actual_start, s.actual_end, s.status, s.shift";

/// 班次维度的计划汇总行
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftPlanRow {
    pub shift: Shift,
    pub schedule_count: i64,
    pub total_planned: i64,
    pub total_actual: i64,
    pub avg_achievement: f64,
}

/// 超期计划 + 产线名称
#[derive(Debug, Clone, PartialEq)]
pub struct DelayedScheduleRow {
    pub schedule: ProductionSchedule,
    pub line_name: String,
}

// ==========================================
// ProductionScheduleRepository - 排产计划仓储
// ==========================================
pub struct ProductionScheduleRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionScheduleRepository {
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

    pub fn find_by_id_in(conn: &Connection, schedule_id: i64) -> RepositoryResult<Option<ProductionSchedule>> {
        let sql = format!(
            "SELECT {} FROM production_schedule s WHERE s.schedule_id = ?1",
            SCHEDULE_COLUMNS
        );
        let schedule = conn.query_row(&sql, params![schedule_id], map_row).optional()?;
        Ok(schedule)
    }

    /// 写回进度字段 (实际数量 / 实际起止 / 状态)
    pub fn save_progress_in(conn: &Connection, schedule: &ProductionSchedule) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"
            UPDATE production_schedule
            SET actual_quantity = ?1, actual_start = ?2, actual_end = ?3, status = ?4
            WHERE schedule_id = ?5
            "#,
            params![
                schedule.actual_quantity,
                schedule.actual_start.map(fmt_ts),
                schedule.actual_end.map(fmt_ts),
                schedule.status.as_str(),
                schedule.schedule_id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("ProductionSchedule", schedule.schedule_id));
        }
        Ok(())
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 新建计划 (pending, 实际数量 0)
    pub fn insert(&self, schedule: &NewProductionSchedule) -> RepositoryResult<ProductionSchedule> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO production_schedule (
                production_line_id, product_name, product_code, planned_quantity,
                actual_quantity, scheduled_start, scheduled_end, status, shift
            ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?8)
            "#,
            params![
                schedule.production_line_id,
                schedule.product_name,
                schedule.product_code,
                schedule.planned_quantity,
                fmt_ts(schedule.scheduled_start),
                fmt_ts(schedule.scheduled_end),
                ScheduleStatus::Pending.as_str(),
                schedule.shift.map(|s| s.as_str()),
            ],
        )?;
        let schedule_id = conn.last_insert_rowid();

        Self::find_by_id_in(&conn, schedule_id)?
            .ok_or_else(|| RepositoryError::not_found("ProductionSchedule", schedule_id))
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, schedule_id: i64) -> RepositoryResult<Option<ProductionSchedule>> {
        let conn = self.get_conn()?;
        Self::find_by_id_in(&conn, schedule_id)
    }

    pub fn get(&self, schedule_id: i64) -> RepositoryResult<ProductionSchedule> {
        self.find_by_id(schedule_id)?
            .ok_or_else(|| RepositoryError::not_found("ProductionSchedule", schedule_id))
    }

    /// 按过滤条件查询 (开工时间降序)
    pub fn list(&self, filter: &ScheduleFilter) -> RepositoryResult<Vec<ProductionSchedule>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM production_schedule s
            WHERE (?1 IS NULL OR s.production_line_id = ?1)
              AND (?2 IS NULL OR s.status = ?2)
              AND (?3 IS NULL OR s.shift = ?3)
            ORDER BY s.scheduled_start DESC, s.schedule_id DESC
            "#,
            SCHEDULE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let schedules = stmt
            .query_map(
                params![
                    filter.line_id,
                    filter.status.map(|s| s.as_str()),
                    filter.shift.map(|s| s.as_str())
                ],
                map_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(schedules)
    }

    /// 未关闭计划 (pending / in_progress), 开工时间升序
    pub fn list_open(&self, line_id: Option<i64>) -> RepositoryResult<Vec<ProductionSchedule>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM production_schedule s
            WHERE (?1 IS NULL OR s.production_line_id = ?1)
              AND s.status IN ('pending', 'in_progress')
            ORDER BY s.scheduled_start ASC, s.schedule_id ASC
            "#,
            SCHEDULE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let schedules = stmt
            .query_map(params![line_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(schedules)
    }

    /// since 之后开工的全部计划
    pub fn list_since(&self, line_id: Option<i64>, since: NaiveDateTime) -> RepositoryResult<Vec<ProductionSchedule>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM production_schedule s
            WHERE (?1 IS NULL OR s.production_line_id = ?1)
              AND s.scheduled_start >= ?2
            ORDER BY s.scheduled_start ASC, s.schedule_id ASC
            "#,
            SCHEDULE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let schedules = stmt
            .query_map(params![line_id, fmt_ts(since)], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(schedules)
    }

    /// 按开工日期汇总计划 / 实际数量
    pub fn daily_plan_rows(&self, line_id: Option<i64>, since: NaiveDateTime) -> RepositoryResult<Vec<DailyPlanActual>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT substr(scheduled_start, 1, 10) AS date,
                   SUM(planned_quantity),
                   SUM(actual_quantity),
                   COUNT(*)
            FROM production_schedule
            WHERE (?1 IS NULL OR production_line_id = ?1)
              AND scheduled_start >= ?2
            GROUP BY date
            ORDER BY date ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![line_id, fmt_ts(since)], |row| {
                Ok(DailyPlanActual {
                    date: row.get(0)?,
                    planned: row.get(1)?,
                    actual: row.get(2)?,
                    schedule_count: row.get(3)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 按班次汇总 (只含带班次的计划)
    pub fn shift_plan_rows(&self, line_id: Option<i64>, since: NaiveDateTime) -> RepositoryResult<Vec<ShiftPlanRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT shift,
                   COUNT(*),
                   SUM(planned_quantity),
                   SUM(actual_quantity),
                   AVG(CASE WHEN planned_quantity > 0
                            THEN actual_quantity * 100.0 / planned_quantity
                            ELSE 0 END)
            FROM production_schedule
            WHERE (?1 IS NULL OR production_line_id = ?1)
              AND scheduled_start >= ?2
              AND shift IS NOT NULL
            GROUP BY shift
            "#,
        )?;
        let rows = stmt
            .query_map(params![line_id, fmt_ts(since)], |row| {
                Ok(ShiftPlanRow {
                    shift: shift_column(row, 0)?,
                    schedule_count: row.get(1)?,
                    total_planned: row.get(2)?,
                    total_actual: row.get(3)?,
                    avg_achievement: row.get(4)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 生产中且已过计划完工时间的计划
    pub fn list_delayed(&self, line_id: Option<i64>, now: NaiveDateTime) -> RepositoryResult<Vec<DelayedScheduleRow>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {}, l.name
            FROM production_schedule s
            JOIN production_line l ON l.line_id = s.production_line_id
            WHERE (?1 IS NULL OR s.production_line_id = ?1)
              AND s.status = 'in_progress'
              AND s.scheduled_end < ?2
            ORDER BY s.scheduled_end ASC, s.schedule_id ASC
            "#,
            SCHEDULE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![line_id, fmt_ts(now)], |row| {
                Ok(DelayedScheduleRow {
                    schedule: map_row(row)?,
                    line_name: row.get(12)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 当前生产中的计划 (最早开工的一条)
    pub fn find_current(&self, line_id: Option<i64>) -> RepositoryResult<Option<ProductionSchedule>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM production_schedule s
            WHERE (?1 IS NULL OR s.production_line_id = ?1)
              AND s.status = 'in_progress'
            ORDER BY s.scheduled_start ASC, s.schedule_id ASC
            LIMIT 1
            "#,
            SCHEDULE_COLUMNS
        );
        let schedule = conn.query_row(&sql, params![line_id], map_row).optional()?;
        Ok(schedule)
    }

    /// 尚未开工的后续计划
    pub fn list_upcoming(
        &self,
        line_id: Option<i64>,
        now: NaiveDateTime,
        limit: usize,
    ) -> RepositoryResult<Vec<ProductionSchedule>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM production_schedule s
            WHERE (?1 IS NULL OR s.production_line_id = ?1)
              AND s.status = 'pending'
              AND s.scheduled_start > ?2
            ORDER BY s.scheduled_start ASC, s.schedule_id ASC
            LIMIT ?3
            "#,
            SCHEDULE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let schedules = stmt
            .query_map(params![line_id, fmt_ts(now), limit as i64], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(schedules)
    }

    /// 最近完工的计划 (实际完工时间降序)
    pub fn list_recent_completed(&self, line_id: Option<i64>, limit: usize) -> RepositoryResult<Vec<ProductionSchedule>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM production_schedule s
            WHERE (?1 IS NULL OR s.production_line_id = ?1)
              AND s.status = 'completed'
            ORDER BY s.actual_end DESC, s.schedule_id DESC
            LIMIT ?2
            "#,
            SCHEDULE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let schedules = stmt
            .query_map(params![line_id, limit as i64], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(schedules)
    }
}

fn map_row(row: &Row) -> SqliteResult<ProductionSchedule> {
    Ok(ProductionSchedule {
        schedule_id: row.get(0)?,
        production_line_id: row.get(1)?,
        product_name: row.get(2)?,
        product_code: row.get(3)?,
        planned_quantity: row.get(4)?,
        actual_quantity: row.get(5)?,
        scheduled_start: ts_column(row, 6)?,
        scheduled_end: ts_column(row, 7)?,
        actual_start: opt_ts_column(row, 8)?,
        actual_end: opt_ts_column(row, 9)?,
        status: schedule_status_column(row, 10)?,
        shift: opt_shift_column(row, 11)?,
    })
}
