// ==========================================
// 设备综合效率系统 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合各引擎所需的 Repository, 共享同一数据库连接
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{
    DowntimeRepository, MachineRepository, ProductionLineRepository, ProductionOutputRepository,
    ProductionScheduleRepository, StatusLogRepository,
};

/// OEE 引擎仓储集合
///
/// 所有仓储持有同一个 `Arc<Mutex<Connection>>`; 状态机直接使用 `conn`
/// 组合跨表事务
#[derive(Clone)]
pub struct OeeRepositories {
    pub conn: Arc<Mutex<Connection>>,
    pub line_repo: Arc<ProductionLineRepository>,
    pub machine_repo: Arc<MachineRepository>,
    pub status_log_repo: Arc<StatusLogRepository>,
    pub downtime_repo: Arc<DowntimeRepository>,
    pub output_repo: Arc<ProductionOutputRepository>,
    pub schedule_repo: Arc<ProductionScheduleRepository>,
}

impl OeeRepositories {
    /// 基于共享连接创建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            line_repo: Arc::new(ProductionLineRepository::new(conn.clone())),
            machine_repo: Arc::new(MachineRepository::new(conn.clone())),
            status_log_repo: Arc::new(StatusLogRepository::new(conn.clone())),
            downtime_repo: Arc::new(DowntimeRepository::new(conn.clone())),
            output_repo: Arc::new(ProductionOutputRepository::new(conn.clone())),
            schedule_repo: Arc::new(ProductionScheduleRepository::new(conn.clone())),
            conn,
        }
    }
}
