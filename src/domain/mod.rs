// ==========================================
// 设备综合效率系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、指标结果
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod ledger;
pub mod machine;
pub mod metrics;
pub mod schedule;
pub mod shift;
pub mod types;

// 重导出核心类型
pub use ledger::{
    DowntimeEntry, NewDowntime, NewProductionOutput, OutputTotals, ProductionOutput,
    StatusLogEntry,
};
pub use machine::{Machine, NewMachine, ProductionLine};
pub use metrics::{
    CategoryStat, CurrentDowntime, LineOeeResult, LineStatusOverview, MachineOeeSummary,
    MachinePerformance, OeeDetails, OeeResult, ParetoItem, ParetoReport, PlantOeeResult,
    ProductionTrendPoint, RealTimeMetrics, ReliabilityMetrics, StatusTransitionMetrics,
};
pub use schedule::{
    CurrentSchedule, DailyPlanActual, DelayedSchedule, NewProductionSchedule, PlannedVsActual,
    ProductionSchedule, ScheduleFilter, ScheduleOverview, ScheduleStatus, ScheduleStatusBoard,
    ScheduleSummary, ShiftAnalysis, ShiftPlanPerformance,
};
pub use shift::{Shift, ShiftSchedule, ShiftWindow};
pub use types::{days_between, DowntimeCategory, LineStatus, MachineStatus, Period};
