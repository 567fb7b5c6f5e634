// ==========================================
// 设备综合效率系统 - 产线数据仓储
// ==========================================
// 职责: production_line 表的读写; 派生状态按成员设备重算
// 红线: 派生状态只在设备状态变更的事务内重算
// ==========================================

use crate::db::{fmt_ts, parse_ts};
use crate::domain::machine::ProductionLine;
use crate::domain::types::{LineStatus, MachineStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// ProductionLineRepository - 产线仓储
// ==========================================
pub struct ProductionLineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionLineRepository {
    /// 从共享连接创建仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 事务内操作 (由调用方持有连接/事务)
    // ==========================================

    /// 读取产线下所有设备的状态 (含停用设备)
    pub fn member_statuses_in(conn: &Connection, line_id: i64) -> RepositoryResult<Vec<MachineStatus>> {
        let mut stmt = conn.prepare(
            "SELECT status FROM machine WHERE production_line_id = ?1 ORDER BY machine_id",
        )?;
        let raw = stmt
            .query_map(params![line_id], |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<Vec<_>>>()?;

        raw.iter()
            .map(|s| {
                MachineStatus::parse(s).ok_or_else(|| RepositoryError::FieldValueError {
                    field: "machine.status".to_string(),
                    message: format!("未知设备状态: {}", s),
                })
            })
            .collect()
    }

    /// 按成员设备重算并写回产线派生状态
    pub fn recompute_status_in(conn: &Connection, line_id: i64) -> RepositoryResult<LineStatus> {
        let statuses = Self::member_statuses_in(conn, line_id)?;
        let status = LineStatus::derive(&statuses);

        let rows = conn.execute(
            "UPDATE production_line SET status = ?1 WHERE line_id = ?2",
            params![status.as_str(), line_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("ProductionLine", line_id));
        }
        Ok(status)
    }

    pub fn find_by_id_in(conn: &Connection, line_id: i64) -> RepositoryResult<Option<ProductionLine>> {
        let line = conn
            .query_row(
                r#"
                SELECT line_id, name, code, status, is_active, created_at
                FROM production_line
                WHERE line_id = ?1
                "#,
                params![line_id],
                map_row,
            )
            .optional()?;
        Ok(line)
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 新建产线 (无设备时状态为 stopped)
    pub fn insert(&self, name: &str, code: &str, now: NaiveDateTime) -> RepositoryResult<ProductionLine> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO production_line (name, code, status, is_active, created_at)
            VALUES (?1, ?2, ?3, 1, ?4)
            "#,
            params![name, code, LineStatus::Stopped.as_str(), fmt_ts(now)],
        )?;
        let line_id = conn.last_insert_rowid();

        Self::find_by_id_in(&conn, line_id)?
            .ok_or_else(|| RepositoryError::not_found("ProductionLine", line_id))
    }

    /// 启用/停用产线
    pub fn set_active(&self, line_id: i64, is_active: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE production_line SET is_active = ?1 WHERE line_id = ?2",
            params![is_active, line_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("ProductionLine", line_id));
        }
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, line_id: i64) -> RepositoryResult<Option<ProductionLine>> {
        let conn = self.get_conn()?;
        Self::find_by_id_in(&conn, line_id)
    }

    /// 查询全部活跃产线
    pub fn list_active(&self) -> RepositoryResult<Vec<ProductionLine>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT line_id, name, code, status, is_active, created_at
            FROM production_line
            WHERE is_active = 1
            ORDER BY line_id
            "#,
        )?;
        let lines = stmt
            .query_map([], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(lines)
    }
}

fn map_row(row: &Row) -> SqliteResult<ProductionLine> {
    let raw_status: String = row.get(3)?;
    let status = LineStatus::parse(&raw_status).unwrap_or(LineStatus::Stopped);
    Ok(ProductionLine {
        line_id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        status,
        is_active: row.get(4)?,
        created_at: parse_ts(&row.get::<_, String>(5)?, 5)?,
    })
}
