// ==========================================
// 设备综合效率系统 - 生产参数
// ==========================================
// 职责: OEE 计算与报表所需的参数 (计划工时 / 班次 / 目标值 / 帕累托条数)
// 说明: OEE 目标仅用于展示达成情况, 核心计算不依赖
// ==========================================

use crate::domain::metrics::OeeResult;
use crate::domain::shift::ShiftSchedule;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKING_HOURS_PER_DAY: u32 = 16;
pub const DEFAULT_PARETO_LIMIT: usize = 10;

/// OEE 目标值 (百分比)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OeeTargets {
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub overall: f64,
}

impl Default for OeeTargets {
    fn default() -> Self {
        Self {
            availability: 90.0,
            performance: 95.0,
            quality: 99.0,
            overall: 85.0,
        }
    }
}

/// 各项指标是否达标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAttainment {
    pub availability: bool,
    pub performance: bool,
    pub quality: bool,
    pub overall: bool,
}

impl TargetAttainment {
    pub fn all_met(&self) -> bool {
        self.availability && self.performance && self.quality && self.overall
    }
}

impl OeeTargets {
    pub fn evaluate(&self, result: &OeeResult) -> TargetAttainment {
        TargetAttainment {
            availability: result.availability >= self.availability,
            performance: result.performance >= self.performance,
            quality: result.quality >= self.quality,
            overall: result.oee >= self.overall,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionConfig {
    /// 每日计划生产小时数
    pub working_hours_per_day: u32,
    pub shifts: ShiftSchedule,
    pub oee_targets: OeeTargets,
    pub pareto_limit: usize,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            working_hours_per_day: DEFAULT_WORKING_HOURS_PER_DAY,
            shifts: ShiftSchedule::default(),
            oee_targets: OeeTargets::default(),
            pareto_limit: DEFAULT_PARETO_LIMIT,
        }
    }
}

impl ProductionConfig {
    /// 每日计划生产秒数
    pub fn planned_seconds_per_day(&self) -> i64 {
        self.working_hours_per_day as i64 * 3600
    }
}
