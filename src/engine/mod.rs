// ==========================================
// 设备综合效率系统 - 引擎层
// ==========================================
// 职责: 实现业务规则 (状态机 / OEE / 可靠性 / 生产指标 / 排产计划), 不拼 SQL
// 红线: Engine 不拼 SQL; 时间一律来自注入的 Clock
// ==========================================

pub mod clock;
pub mod error;
pub mod events;
pub mod oee;
pub mod production_metrics;
pub mod reliability;
pub mod repositories;
pub mod schedule;
pub mod status_machine;
pub mod status_overview;

// 重导出核心引擎
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{EngineError, EngineResult};
pub use events::{
    BroadcastNotifier, MachineStatusChanged, NoOpNotifier, OeeEventNotifier, OptionalNotifier,
    ProductionOutputRecorded,
};
pub use oee::{planned_production_time, OeeCalculator, OeeInputs, OeeRatios};
pub use production_metrics::ProductionMetricsEngine;
pub use reliability::{availability_from_reliability, ReliabilityAnalyzer};
pub use repositories::OeeRepositories;
pub use schedule::ProductionScheduleEngine;
pub use status_machine::{
    MachineStatusEngine, StatusChangeRequest, TransitionEffects, TransitionOutcome,
};
pub use status_overview::{format_duration, StatusOverviewService};
