// ==========================================
// 设备综合效率系统 - 排产计划
// ==========================================
// 职责: 排产计划实体、状态与计划/实际对比结果
// 状态流转: pending → in_progress → completed
//           pending / in_progress → cancelled
// ==========================================

use crate::domain::metrics::{round2, safe_ratio};
use crate::domain::shift::Shift;
use crate::domain::types::Period;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 计划状态 (Schedule Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,    // 待开工
    InProgress, // 生产中
    Completed,  // 已完工
    Cancelled,  // 已取消
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::InProgress => "in_progress",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(ScheduleStatus::Pending),
            "in_progress" => Some(ScheduleStatus::InProgress),
            "completed" => Some(ScheduleStatus::Completed),
            "cancelled" => Some(ScheduleStatus::Cancelled),
            _ => None,
        }
    }

    /// 已完工或已取消
    pub fn is_closed(&self) -> bool {
        matches!(self, ScheduleStatus::Completed | ScheduleStatus::Cancelled)
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// ProductionSchedule - 排产计划
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionSchedule {
    pub schedule_id: i64,
    pub production_line_id: i64,
    pub product_name: String,
    pub product_code: String,
    pub planned_quantity: i64,
    pub actual_quantity: i64,
    pub scheduled_start: NaiveDateTime,
    pub scheduled_end: NaiveDateTime,
    pub actual_start: Option<NaiveDateTime>,
    pub actual_end: Option<NaiveDateTime>,
    pub status: ScheduleStatus,
    pub shift: Option<Shift>,
}

impl ProductionSchedule {
    /// 完成率 (%), 计划数量为 0 时为 0
    pub fn completion_percentage(&self) -> f64 {
        round2(safe_ratio(self.actual_quantity as f64, self.planned_quantity as f64) * 100.0)
    }

    /// 剩余数量 (超产时为负)
    pub fn remaining_quantity(&self) -> i64 {
        self.planned_quantity - self.actual_quantity
    }
}

/// 新建排产计划参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProductionSchedule {
    pub production_line_id: i64,
    pub product_name: String,
    pub product_code: String,
    pub planned_quantity: i64,
    pub scheduled_start: NaiveDateTime,
    pub scheduled_end: NaiveDateTime,
    pub shift: Option<Shift>,
}

/// 排产计划查询过滤
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleFilter {
    pub line_id: Option<i64>,
    pub status: Option<ScheduleStatus>,
    pub shift: Option<Shift>,
}

// ==========================================
// 计划看板结果
// ==========================================

/// 未关闭计划按开工时间分组
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOverview {
    pub today: Vec<ProductionSchedule>,
    pub tomorrow: Vec<ProductionSchedule>,
    pub this_week: Vec<ProductionSchedule>,
    pub next_week: Vec<ProductionSchedule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub total_schedules: i64,
    pub completed: i64,
    pub in_progress: i64,
    pub pending: i64,
    pub cancelled: i64,
    pub total_planned_quantity: i64,
    pub total_actual_quantity: i64,
    /// 实际 / 计划 (%)
    pub achievement_rate: f64,
}

/// 按开工日期汇总的计划与实际
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPlanActual {
    pub date: String,
    pub planned: i64,
    pub actual: i64,
    pub schedule_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedVsActual {
    pub summary: ScheduleSummary,
    pub daily: Vec<DailyPlanActual>,
    pub period: Period,
    pub start_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftPlanPerformance {
    pub shift: Shift,
    pub schedule_count: i64,
    pub total_planned: i64,
    pub total_actual: i64,
    /// 各计划完成率的平均值 (%)
    pub avg_achievement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftAnalysis {
    /// 固定顺序: 早 / 中 / 夜
    pub shift_performance: Vec<ShiftPlanPerformance>,
    /// 窗口内无带班次的计划时为 None
    pub best_shift: Option<Shift>,
    pub period_days: i64,
    pub start_date: NaiveDateTime,
}

/// 超期未完工计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayedSchedule {
    pub schedule_id: i64,
    pub product_name: String,
    pub product_code: String,
    pub line_name: String,
    pub scheduled_end: NaiveDateTime,
    pub delay_hours: i64,
    pub completion_percentage: f64,
    pub remaining_quantity: i64,
}

/// 当前生产中的计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentSchedule {
    pub schedule: ProductionSchedule,
    pub completion_percentage: f64,
    /// 已开工分钟数
    pub time_elapsed: i64,
    /// 距计划完工分钟数 (已超期为负)
    pub time_remaining: i64,
    /// 关联到该计划的产出登记合计
    pub recorded_produced: i64,
    pub recorded_rejected: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStatusBoard {
    pub current: Option<CurrentSchedule>,
    pub upcoming: Vec<ProductionSchedule>,
    pub recent_completed: Vec<ProductionSchedule>,
}
