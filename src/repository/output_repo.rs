// ==========================================
// 设备综合效率系统 - 产出记录仓储
// ==========================================
// 对齐: production_output 表
// 红线: 产出记录只追加, 不更新不删除; 数值校验在引擎层完成
// ==========================================

use crate::db::fmt_ts;
use crate::domain::ledger::{NewProductionOutput, OutputTotals, ProductionOutput};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::ts_column;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

/// 单机产出聚合行
#[derive(Debug, Clone, PartialEq)]
pub struct MachineOutputRow {
    pub machine_id: i64,
    pub name: String,
    pub code: String,
    pub total_produced: i64,
    pub total_rejected: i64,
    pub avg_cycle_time: Option<f64>,
    pub production_runs: i64,
}

/// 产量趋势分桶行
#[derive(Debug, Clone, PartialEq)]
pub struct TrendRow {
    pub bucket: String,
    pub total_produced: i64,
    pub total_rejected: i64,
    pub machines_used: i64,
    pub avg_cycle_time: Option<f64>,
}

pub struct ProductionOutputRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionOutputRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加产出记录
    pub fn insert(&self, output: &NewProductionOutput) -> RepositoryResult<ProductionOutput> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO production_output (
                machine_id, production_schedule_id, quantity_produced,
                quantity_rejected, cycle_time, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                output.machine_id,
                output.production_schedule_id,
                output.quantity_produced,
                output.quantity_rejected,
                output.cycle_time,
                fmt_ts(output.recorded_at),
            ],
        )?;

        Ok(ProductionOutput {
            output_id: conn.last_insert_rowid(),
            machine_id: output.machine_id,
            production_schedule_id: output.production_schedule_id,
            quantity_produced: output.quantity_produced,
            quantity_rejected: output.quantity_rejected,
            cycle_time: output.cycle_time,
            recorded_at: output.recorded_at,
        })
    }

    pub fn list_by_machine(&self, machine_id: i64) -> RepositoryResult<Vec<ProductionOutput>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT output_id, machine_id, production_schedule_id, quantity_produced,
                   quantity_rejected, cycle_time, recorded_at
            FROM production_output
            WHERE machine_id = ?1
            ORDER BY recorded_at ASC, output_id ASC
            "#,
        )?;
        let outputs = stmt
            .query_map(params![machine_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(outputs)
    }

    /// 单机窗口内产出合计 (recorded_at 闭区间)
    pub fn totals_in_window(
        &self,
        machine_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> RepositoryResult<OutputTotals> {
        let conn = self.get_conn()?;
        let totals = conn.query_row(
            r#"
            SELECT COALESCE(SUM(quantity_produced), 0), COALESCE(SUM(quantity_rejected), 0)
            FROM production_output
            WHERE machine_id = ?1 AND recorded_at BETWEEN ?2 AND ?3
            "#,
            params![machine_id, fmt_ts(start), fmt_ts(end)],
            map_totals,
        )?;
        Ok(totals)
    }

    /// 关联到排产计划的产出合计
    pub fn totals_for_schedule(&self, schedule_id: i64) -> RepositoryResult<OutputTotals> {
        let conn = self.get_conn()?;
        let totals = conn.query_row(
            r#"
            SELECT COALESCE(SUM(quantity_produced), 0), COALESCE(SUM(quantity_rejected), 0)
            FROM production_output
            WHERE production_schedule_id = ?1
            "#,
            params![schedule_id],
            map_totals,
        )?;
        Ok(totals)
    }

    /// 产线 since 之后的产出合计
    pub fn line_totals_since(&self, line_id: i64, since: NaiveDateTime) -> RepositoryResult<OutputTotals> {
        let conn = self.get_conn()?;
        let totals = conn.query_row(
            r#"
            SELECT COALESCE(SUM(o.quantity_produced), 0), COALESCE(SUM(o.quantity_rejected), 0)
            FROM production_output o
            JOIN machine m ON m.machine_id = o.machine_id
            WHERE m.production_line_id = ?1 AND o.recorded_at >= ?2
            "#,
            params![line_id, fmt_ts(since)],
            map_totals,
        )?;
        Ok(totals)
    }

    /// 产线各设备产出对比 (按总产量降序)
    pub fn machine_performance_rows(
        &self,
        line_id: i64,
        since: NaiveDateTime,
    ) -> RepositoryResult<Vec<MachineOutputRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT m.machine_id, m.name, m.code,
                   SUM(o.quantity_produced) AS total_produced,
                   SUM(o.quantity_rejected),
                   AVG(o.cycle_time),
                   COUNT(*)
            FROM production_output o
            JOIN machine m ON m.machine_id = o.machine_id
            WHERE m.production_line_id = ?1 AND o.recorded_at >= ?2
            GROUP BY m.machine_id, m.name, m.code
            ORDER BY total_produced DESC, m.machine_id ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![line_id, fmt_ts(since)], |row| {
                Ok(MachineOutputRow {
                    machine_id: row.get(0)?,
                    name: row.get(1)?,
                    code: row.get(2)?,
                    total_produced: row.get(3)?,
                    total_rejected: row.get(4)?,
                    avg_cycle_time: row.get(5)?,
                    production_runs: row.get(6)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 产线产量趋势
    ///
    /// # 参数
    /// - `bucket_format`: strftime 分桶格式, 见 `Period::trend_bucket_format`
    pub fn trend_rows(
        &self,
        line_id: i64,
        since: NaiveDateTime,
        bucket_format: &str,
    ) -> RepositoryResult<Vec<TrendRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT strftime(?3, o.recorded_at) AS bucket,
                   SUM(o.quantity_produced),
                   SUM(o.quantity_rejected),
                   COUNT(DISTINCT o.machine_id),
                   AVG(o.cycle_time)
            FROM production_output o
            JOIN machine m ON m.machine_id = o.machine_id
            WHERE m.production_line_id = ?1 AND o.recorded_at >= ?2
            GROUP BY bucket
            ORDER BY bucket ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![line_id, fmt_ts(since), bucket_format], |row| {
                Ok(TrendRow {
                    bucket: row.get(0)?,
                    total_produced: row.get(1)?,
                    total_rejected: row.get(2)?,
                    machines_used: row.get(3)?,
                    avg_cycle_time: row.get(4)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}

fn map_totals(row: &Row) -> SqliteResult<OutputTotals> {
    Ok(OutputTotals {
        produced: row.get(0)?,
        rejected: row.get(1)?,
    })
}

fn map_row(row: &Row) -> SqliteResult<ProductionOutput> {
    Ok(ProductionOutput {
        output_id: row.get(0)?,
        machine_id: row.get(1)?,
        production_schedule_id: row.get(2)?,
        quantity_produced: row.get(3)?,
        quantity_rejected: row.get(4)?,
        cycle_time: row.get(5)?,
        recorded_at: ts_column(row, 6)?,
    })
}
