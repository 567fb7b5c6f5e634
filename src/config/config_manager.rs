// ==========================================
// 设备综合效率系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope, 本系统只使用 'global')
// 约束: 缺失键使用默认值; 格式错误的值记录 warn 后使用默认值
// ==========================================

use crate::config::production_config::{OeeTargets, ProductionConfig};
use crate::db::open_sqlite_connection;
use crate::domain::shift::ShiftSchedule;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置锁获取失败: {0}")]
    LockError(String),

    #[error("配置读取失败: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("配置序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> ConfigResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| ConfigError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 配置 (UPSERT)
    pub fn set_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES ('global', ?1, ?2, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')
            "#,
            params![key, value],
        )?;
        tracing::info!(config_key = key, value, "配置已更新");
        Ok(())
    }

    /// 获取所有 global 配置的快照 (JSON)
    pub fn config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 读取并解析配置, 缺失或格式错误时返回默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Copy,
    {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(default);
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
                Ok(default)
            }
        }
    }

    // ===== 生产参数 =====

    pub fn get_working_hours_per_day(&self) -> ConfigResult<u32> {
        let default = ProductionConfig::default().working_hours_per_day;
        let hours = self.get_parsed_or_default(config_keys::WORKING_HOURS_PER_DAY, default)?;
        if hours == 0 || hours > 24 {
            tracing::warn!(config_key = config_keys::WORKING_HOURS_PER_DAY, hours, "计划工时越界，使用默认值");
            return Ok(default);
        }
        Ok(hours)
    }

    pub fn get_shift_schedule(&self) -> ConfigResult<ShiftSchedule> {
        let default = ShiftSchedule::default();
        let schedule = ShiftSchedule {
            morning_start: self.get_parsed_or_default(config_keys::SHIFT_MORNING_START, default.morning_start)?,
            afternoon_start: self
                .get_parsed_or_default(config_keys::SHIFT_AFTERNOON_START, default.afternoon_start)?,
            night_start: self.get_parsed_or_default(config_keys::SHIFT_NIGHT_START, default.night_start)?,
        };
        if !schedule.is_valid() {
            tracing::warn!(?schedule, "班次配置无效，使用默认班次");
            return Ok(default);
        }
        Ok(schedule)
    }

    pub fn get_oee_targets(&self) -> ConfigResult<OeeTargets> {
        let default = OeeTargets::default();
        Ok(OeeTargets {
            availability: self.get_parsed_or_default(config_keys::OEE_TARGET_AVAILABILITY, default.availability)?,
            performance: self.get_parsed_or_default(config_keys::OEE_TARGET_PERFORMANCE, default.performance)?,
            quality: self.get_parsed_or_default(config_keys::OEE_TARGET_QUALITY, default.quality)?,
            overall: self.get_parsed_or_default(config_keys::OEE_TARGET_OVERALL, default.overall)?,
        })
    }

    pub fn get_pareto_limit(&self) -> ConfigResult<usize> {
        let default = ProductionConfig::default().pareto_limit;
        let limit = self.get_parsed_or_default(config_keys::PARETO_LIMIT, default)?;
        Ok(if limit == 0 { default } else { limit })
    }

    /// 加载完整生产参数
    pub fn load_production_config(&self) -> ConfigResult<ProductionConfig> {
        Ok(ProductionConfig {
            working_hours_per_day: self.get_working_hours_per_day()?,
            shifts: self.get_shift_schedule()?,
            oee_targets: self.get_oee_targets()?,
            pareto_limit: self.get_pareto_limit()?,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 计划工时
    pub const WORKING_HOURS_PER_DAY: &str = "working_hours_per_day";

    // 班次起始小时
    pub const SHIFT_MORNING_START: &str = "shift_morning_start";
    pub const SHIFT_AFTERNOON_START: &str = "shift_afternoon_start";
    pub const SHIFT_NIGHT_START: &str = "shift_night_start";

    // OEE 目标 (百分比)
    pub const OEE_TARGET_AVAILABILITY: &str = "oee_target_availability";
    pub const OEE_TARGET_PERFORMANCE: &str = "oee_target_performance";
    pub const OEE_TARGET_QUALITY: &str = "oee_target_quality";
    pub const OEE_TARGET_OVERALL: &str = "oee_target_overall";

    // 帕累托条数
    pub const PARETO_LIMIT: &str = "pareto_limit";
}
