// ==========================================
// 设备综合效率系统 - 配置层
// ==========================================
// 职责: 生产参数管理, 支持 config_kv 覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod production_config;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigError, ConfigManager, ConfigResult};
pub use production_config::{OeeTargets, ProductionConfig, TargetAttainment};
