// ==========================================
// 设备综合效率系统 - 台账条目领域模型
// ==========================================
// 对齐: machine_status_log / downtime / production_output 表
// 约束: 同一设备任意时刻最多一条 ended_at 为空的状态条目 / 停机条目
// ==========================================

use crate::domain::types::{DowntimeCategory, MachineStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// StatusLogEntry - 设备状态区间
// ==========================================
// duration 在区间未结束时为 None
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub log_id: i64,
    pub machine_id: i64,
    pub status: MachineStatus,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub duration: Option<i64>, // 秒
}

impl StatusLogEntry {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// 已持续秒数 (未结束时按 now 计算)
    pub fn elapsed_seconds(&self, now: NaiveDateTime) -> i64 {
        match self.duration {
            Some(d) => d,
            None => (now - self.started_at).num_seconds().max(0),
        }
    }
}

// ==========================================
// DowntimeEntry - 停机区间
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DowntimeEntry {
    pub downtime_id: i64,
    pub machine_id: i64,
    pub reason: String,
    pub description: Option<String>,
    pub category: DowntimeCategory,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub duration: Option<i64>, // 秒
    pub is_planned: bool,
}

impl DowntimeEntry {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// 开启停机所需字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDowntime {
    pub reason: String,
    pub description: Option<String>,
    pub category: DowntimeCategory,
    pub is_planned: bool,
}

// ==========================================
// ProductionOutput - 产出记录 (不可变)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionOutput {
    pub output_id: i64,
    pub machine_id: i64,
    pub production_schedule_id: Option<i64>,
    pub quantity_produced: i64,
    pub quantity_rejected: i64,
    pub cycle_time: Option<f64>, // 秒
    pub recorded_at: NaiveDateTime,
}

impl ProductionOutput {
    /// 合格率 (0-1), 产量为 0 时返回 0
    pub fn quality_rate(&self) -> f64 {
        if self.quantity_produced <= 0 {
            return 0.0;
        }
        (self.quantity_produced - self.quantity_rejected) as f64 / self.quantity_produced as f64
    }
}

/// 产出登记参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProductionOutput {
    pub machine_id: i64,
    pub production_schedule_id: Option<i64>,
    pub quantity_produced: i64,
    pub quantity_rejected: i64,
    pub cycle_time: Option<f64>,
    pub recorded_at: NaiveDateTime,
}

/// 窗口内产出汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTotals {
    pub produced: i64,
    pub rejected: i64,
}

impl OutputTotals {
    pub fn good(&self) -> i64 {
        self.produced - self.rejected
    }
}
