// ==========================================
// 设备综合效率系统 - 设备与产线领域模型
// ==========================================
// 对齐: machine / production_line 表
// 说明: Machine.status 是状态台账未结束条目的缓存投影,
//       只允许在状态切换事务内更新
// ==========================================

use crate::domain::types::{LineStatus, MachineStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ProductionLine - 产线
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionLine {
    pub line_id: i64,
    pub name: String,
    pub code: String,
    pub status: LineStatus, // 派生状态 (由成员设备重算)
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

// ==========================================
// Machine - 设备
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub machine_id: i64,
    pub production_line_id: i64,
    pub name: String,
    pub code: String,
    pub status: MachineStatus,
    pub ideal_cycle_time: f64, // 理想节拍 (秒/件)
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

/// 新设备登记参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMachine {
    pub production_line_id: i64,
    pub name: String,
    pub code: String,
    /// 初始状态, 缺省为 Idle
    pub status: Option<MachineStatus>,
    pub ideal_cycle_time: f64,
}

impl NewMachine {
    pub fn new(production_line_id: i64, name: &str, code: &str, ideal_cycle_time: f64) -> Self {
        Self {
            production_line_id,
            name: name.to_string(),
            code: code.to_string(),
            status: None,
            ideal_cycle_time,
        }
    }

    pub fn with_status(mut self, status: MachineStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn initial_status(&self) -> MachineStatus {
        self.status.unwrap_or_default()
    }
}
