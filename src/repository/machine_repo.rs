// ==========================================
// 设备综合效率系统 - 设备数据仓储
// ==========================================
// 职责: machine 表的读写
// 红线: status 字段是状态台账的缓存投影,
//       update_cached_status_in 只能在状态切换事务内调用
// ==========================================

use crate::db::fmt_ts;
use crate::domain::machine::{Machine, NewMachine};
use crate::domain::types::MachineStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{status_column, ts_column};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const MACHINE_COLUMNS: &str = r#"
    machine_id, production_line_id, name, code, status,
    ideal_cycle_time, is_active, created_at
"#;

// ==========================================
// MachineRepository - 设备仓储
// ==========================================
pub struct MachineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MachineRepository {
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

    /// 插入设备行 (不写状态台账, 由调用方在同一事务内补齐)
    pub fn insert_in(conn: &Connection, machine: &NewMachine, now: NaiveDateTime) -> RepositoryResult<Machine> {
        conn.execute(
            r#"
            INSERT INTO machine (
                production_line_id, name, code, status,
                ideal_cycle_time, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
            "#,
            params![
                machine.production_line_id,
                machine.name,
                machine.code,
                machine.initial_status().as_str(),
                machine.ideal_cycle_time,
                fmt_ts(now),
            ],
        )?;
        let machine_id = conn.last_insert_rowid();

        Self::find_by_id_in(conn, machine_id)?
            .ok_or_else(|| RepositoryError::not_found("Machine", machine_id))
    }

    pub fn find_by_id_in(conn: &Connection, machine_id: i64) -> RepositoryResult<Option<Machine>> {
        let sql = format!("SELECT {} FROM machine WHERE machine_id = ?1", MACHINE_COLUMNS);
        let machine = conn.query_row(&sql, params![machine_id], map_row).optional()?;
        Ok(machine)
    }

    /// 更新缓存状态
    pub fn update_cached_status_in(
        conn: &Connection,
        machine_id: i64,
        status: MachineStatus,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            "UPDATE machine SET status = ?1 WHERE machine_id = ?2",
            params![status.as_str(), machine_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Machine", machine_id));
        }
        Ok(())
    }

    pub fn set_active_in(conn: &Connection, machine_id: i64, is_active: bool) -> RepositoryResult<()> {
        let rows = conn.execute(
            "UPDATE machine SET is_active = ?1 WHERE machine_id = ?2",
            params![is_active, machine_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Machine", machine_id));
        }
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, machine_id: i64) -> RepositoryResult<Option<Machine>> {
        let conn = self.get_conn()?;
        Self::find_by_id_in(&conn, machine_id)
    }

    /// 按 ID 查询, 不存在时返回 NotFound
    pub fn get(&self, machine_id: i64) -> RepositoryResult<Machine> {
        self.find_by_id(machine_id)?
            .ok_or_else(|| RepositoryError::not_found("Machine", machine_id))
    }

    /// 产线下全部设备 (含停用)
    pub fn list_by_line(&self, line_id: i64) -> RepositoryResult<Vec<Machine>> {
        self.query_by_line(line_id, false)
    }

    /// 产线下活跃设备
    pub fn list_active_by_line(&self, line_id: i64) -> RepositoryResult<Vec<Machine>> {
        self.query_by_line(line_id, true)
    }

    fn query_by_line(&self, line_id: i64, active_only: bool) -> RepositoryResult<Vec<Machine>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM machine WHERE production_line_id = ?1 {} ORDER BY machine_id",
            MACHINE_COLUMNS,
            if active_only { "AND is_active = 1" } else { "" }
        );
        let mut stmt = conn.prepare(&sql)?;
        let machines = stmt
            .query_map(params![line_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(machines)
    }

    /// 全部设备 (可选按产线过滤)
    pub fn list_all(&self, line_id: Option<i64>) -> RepositoryResult<Vec<Machine>> {
        match line_id {
            Some(id) => self.list_by_line(id),
            None => {
                let conn = self.get_conn()?;
                let sql = format!("SELECT {} FROM machine ORDER BY machine_id", MACHINE_COLUMNS);
                let mut stmt = conn.prepare(&sql)?;
                let machines = stmt
                    .query_map([], map_row)?
                    .collect::<SqliteResult<Vec<_>>>()?;
                Ok(machines)
            }
        }
    }
}

fn map_row(row: &Row) -> SqliteResult<Machine> {
    Ok(Machine {
        machine_id: row.get(0)?,
        production_line_id: row.get(1)?,
        name: row.get(2)?,
        code: row.get(3)?,
        status: status_column(row, 4)?,
        ideal_cycle_time: row.get(5)?,
        is_active: row.get(6)?,
        created_at: ts_column(row, 7)?,
    })
}
