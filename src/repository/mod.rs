// ==========================================
// 设备综合效率系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化; 台账写操作提供 *_in(conn) 版本,
//       由状态机在同一事务内组合
// ==========================================

pub mod downtime_repo;
pub mod error;
pub mod line_repo;
pub mod machine_repo;
pub mod output_repo;
pub mod row_utils;
pub mod schedule_repo;
pub mod status_log_repo;

// 重导出核心仓储
pub use downtime_repo::{
    CategoryAggregateRow, DowntimeRepository, DurationStats, OpenDowntimeRow, ParetoRow,
};
pub use error::{RepositoryError, RepositoryResult};
pub use line_repo::ProductionLineRepository;
pub use machine_repo::MachineRepository;
pub use output_repo::{MachineOutputRow, ProductionOutputRepository, TrendRow};
pub use schedule_repo::{DelayedScheduleRow, ProductionScheduleRepository, ShiftPlanRow};
pub use status_log_repo::{StatusDurationRow, StatusLogRepository};
