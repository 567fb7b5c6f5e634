// ==========================================
// 设备综合效率系统 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 数据库错误 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    // ===== 台账不变量 =====
    #[error("设备已存在未结束停机: machine_id={machine_id}, downtime_id={downtime_id}")]
    OpenDowntimeExists { machine_id: i64, downtime_id: i64 },

    #[error("时间倒退: machine_id={machine_id}, 未结束条目开始于 {started_at}, 结束时间 {ended_at}")]
    TimeRegression {
        machine_id: i64,
        started_at: String,
        ended_at: String,
    },

    // ===== 数据质量错误 =====
    #[error("字段值错误 (field={field}): {message}")]
    FieldValueError { field: String, message: String },

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RepositoryError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        RepositoryError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => {
                if msg.contains("UNIQUE") {
                    RepositoryError::UniqueConstraintViolation(msg)
                } else if msg.contains("FOREIGN KEY") {
                    RepositoryError::ForeignKeyViolation(msg)
                } else {
                    RepositoryError::DatabaseQueryError(msg)
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
                id: "Unknown".to_string(),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

/// 关闭未结束条目前校验结束时间不早于开始时间
pub(crate) fn ensure_not_before(
    machine_id: i64,
    started_at: chrono::NaiveDateTime,
    ended_at: chrono::NaiveDateTime,
) -> Result<i64, RepositoryError> {
    if ended_at < started_at {
        return Err(RepositoryError::TimeRegression {
            machine_id,
            started_at: crate::db::fmt_ts(started_at),
            ended_at: crate::db::fmt_ts(ended_at),
        });
    }
    Ok((ended_at - started_at).num_seconds())
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;
