// ==========================================
// 设备综合效率系统 - 引擎层错误类型
// ==========================================
// 分类:
// - Validation: 调用方输入不合法 (缺少停机原因 / 产出数量越界)
// - InvalidTransition: 违反台账不变量 (已有未结束停机 / 时间倒退)
// - InvalidScheduleTransition: 排产计划状态不允许该操作
// - NotFound: 设备 / 产线不存在
// - Repository: 存储层故障
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("非法状态切换 (machine_id={machine_id}): {reason}")]
    InvalidTransition { machine_id: i64, reason: String },

    #[error("排产计划状态不允许该操作 (schedule_id={schedule_id}): {reason}")]
    InvalidScheduleTransition { schedule_id: i64, reason: String },

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error(transparent)]
    Repository(RepositoryError),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// 是否为调用方可修正的错误 (上层映射为 4xx)
    pub fn is_client_error(&self) -> bool {
        match self {
            EngineError::Validation(_)
            | EngineError::InvalidTransition { .. }
            | EngineError::InvalidScheduleTransition { .. }
            | EngineError::NotFound { .. } => true,
            EngineError::Repository(RepositoryError::FieldValueError { .. }) => true,
            EngineError::Repository(_) => false,
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            RepositoryError::OpenDowntimeExists {
                machine_id,
                downtime_id,
            } => EngineError::InvalidTransition {
                machine_id,
                reason: format!("已存在未结束停机 downtime_id={}", downtime_id),
            },
            RepositoryError::TimeRegression {
                machine_id,
                started_at,
                ended_at,
            } => EngineError::InvalidTransition {
                machine_id,
                reason: format!("切换时间 {} 早于当前条目开始时间 {}", ended_at, started_at),
            },
            other => EngineError::Repository(other),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        RepositoryError::from(err).into()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
