// ==========================================
// 设备综合效率系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 设备状态台账 + OEE / 可靠性指标计算
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 生产参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// 性能统计
pub mod perf;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{DowntimeCategory, LineStatus, MachineStatus, Period};

// 领域实体
pub use domain::{
    DowntimeEntry, LineOeeResult, Machine, NewMachine, NewProductionOutput,
    NewProductionSchedule, OeeResult, ParetoReport, ProductionLine, ProductionOutput,
    ProductionSchedule, ReliabilityMetrics, ScheduleStatus, StatusLogEntry,
};

// 引擎
pub use engine::{
    EngineError, MachineStatusEngine, OeeCalculator, OeeRepositories, ProductionMetricsEngine,
    ProductionScheduleEngine, ReliabilityAnalyzer, StatusChangeRequest, StatusOverviewService,
};

// 配置
pub use config::{ConfigManager, ProductionConfig};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "设备综合效率系统";
