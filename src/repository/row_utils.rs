// ==========================================
// 设备综合效率系统 - 行映射工具
// ==========================================
// 职责: 枚举 / 时间戳列的统一解析, 解析失败转为 rusqlite 转换错误
// ==========================================

use crate::db::parse_ts;
use crate::domain::schedule::ScheduleStatus;
use crate::domain::shift::Shift;
use crate::domain::types::{DowntimeCategory, MachineStatus};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{Result as SqliteResult, Row};

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

pub fn status_column(row: &Row, column: usize) -> SqliteResult<MachineStatus> {
    let raw: String = row.get(column)?;
    MachineStatus::parse(&raw).ok_or_else(|| conversion_error(column, format!("未知设备状态: {}", raw)))
}

pub fn category_column(row: &Row, column: usize) -> SqliteResult<DowntimeCategory> {
    let raw: String = row.get(column)?;
    DowntimeCategory::parse(&raw)
        .ok_or_else(|| conversion_error(column, format!("未知停机分类: {}", raw)))
}

pub fn schedule_status_column(row: &Row, column: usize) -> SqliteResult<ScheduleStatus> {
    let raw: String = row.get(column)?;
    ScheduleStatus::parse(&raw)
        .ok_or_else(|| conversion_error(column, format!("未知计划状态: {}", raw)))
}

pub fn shift_column(row: &Row, column: usize) -> SqliteResult<Shift> {
    let raw: String = row.get(column)?;
    Shift::parse(&raw).ok_or_else(|| conversion_error(column, format!("未知班次: {}", raw)))
}

pub fn opt_shift_column(row: &Row, column: usize) -> SqliteResult<Option<Shift>> {
    match row.get::<_, Option<String>>(column)? {
        Some(raw) => Shift::parse(&raw)
            .map(Some)
            .ok_or_else(|| conversion_error(column, format!("未知班次: {}", raw))),
        None => Ok(None),
    }
}

pub fn ts_column(row: &Row, column: usize) -> SqliteResult<NaiveDateTime> {
    parse_ts(&row.get::<_, String>(column)?, column)
}

pub fn opt_ts_column(row: &Row, column: usize) -> SqliteResult<Option<NaiveDateTime>> {
    match row.get::<_, Option<String>>(column)? {
        Some(raw) => parse_ts(&raw, column).map(Some),
        None => Ok(None),
    }
}
