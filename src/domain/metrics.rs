// ==========================================
// 设备综合效率系统 - 指标结果类型
// ==========================================
// 职责: OEE / 停机统计 / 可靠性 / 实时状态 的输出结构
// 约束: 所有百分比保留 2 位小数; 任何比率都不得出现 NaN / Infinity
// ==========================================

use crate::domain::shift::Shift;
use crate::domain::types::{DowntimeCategory, LineStatus, MachineStatus, Period};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// 除零保护
// ==========================================

/// 安全除法: 分母为 0 或结果非有限值时返回 0
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// 截断到 [0, 1]
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// 四舍五入到 2 位小数
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 比率 → 百分比 (2 位小数)
pub fn to_percent(ratio: f64) -> f64 {
    round2(ratio * 100.0)
}

// ==========================================
// OEE
// ==========================================

/// 单机 OEE 计算明细 (时间单位: 秒)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OeeDetails {
    pub planned_production_time: i64,
    pub run_time: i64,
    pub downtime: i64,
    pub unplanned_downtime: i64,
    pub total_produced: i64,
    pub good_parts: i64,
    pub rejected_parts: i64,
}

/// 单机 OEE 结果 (百分比)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OeeResult {
    pub machine_id: i64,
    pub oee: f64,
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub details: OeeDetails,
}

/// 产线 OEE 中的单机摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineOeeSummary {
    pub machine_id: i64,
    pub machine_name: String,
    pub oee: f64,
}

/// 产线 OEE 结果 (活跃设备的算术平均)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineOeeResult {
    pub line_id: Option<i64>,
    pub oee: f64,
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub machine_count: usize,
    pub machines: Vec<MachineOeeSummary>,
}

impl LineOeeResult {
    /// 无活跃设备时的全零结果
    pub fn empty(line_id: Option<i64>) -> Self {
        Self {
            line_id,
            oee: 0.0,
            availability: 0.0,
            performance: 0.0,
            quality: 0.0,
            machine_count: 0,
            machines: vec![],
        }
    }
}

/// 全厂 OEE (有活跃设备的产线平均)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantOeeResult {
    pub oee: f64,
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub line_count: usize,
}

// ==========================================
// 停机统计
// ==========================================

/// 按分类的停机统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub category: DowntimeCategory,
    pub count: i64,
    pub total_duration: i64,
    pub avg_duration: i64,
    pub min_duration: i64,
    pub max_duration: i64,
    pub percentage: f64,
}

/// 帕累托条目 (按原因 + 分类)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoItem {
    pub reason: String,
    pub category: DowntimeCategory,
    pub frequency: i64,
    pub total_duration: i64,
    pub avg_duration: i64,
    pub percentage: f64,
    pub cumulative_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoReport {
    pub data: Vec<ParetoItem>,
    pub total_downtime: i64,
    pub period: Period,
    pub start_date: NaiveDateTime,
}

/// 当前进行中的停机
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentDowntime {
    pub downtime_id: i64,
    pub machine_id: i64,
    pub machine_name: String,
    pub line_name: String,
    pub reason: String,
    pub category: DowntimeCategory,
    pub started_at: NaiveDateTime,
    pub elapsed_minutes: i64,
    pub is_planned: bool,
}

// ==========================================
// 可靠性
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityMetrics {
    pub machine_id: i64,
    pub mtbf_hours: f64,
    pub mttr_minutes: f64,
    /// MTBF / (MTBF + MTTR) 百分比, MTBF 为 0 时为 0
    pub availability: f64,
}

// ==========================================
// 实时状态
// ==========================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub running: usize,
    pub idle: usize,
    pub maintenance: usize,
    pub breakdown: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: MachineStatus) {
        match status {
            MachineStatus::Running => self.running += 1,
            MachineStatus::Idle => self.idle += 1,
            MachineStatus::Maintenance => self.maintenance += 1,
            MachineStatus::Breakdown => self.breakdown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.running + self.idle + self.maintenance + self.breakdown
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineStatusView {
    pub machine_id: i64,
    pub name: String,
    pub code: String,
    pub status: MachineStatus,
    pub status_duration: String,
    pub status_since: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStatusOverview {
    pub line_id: i64,
    pub name: String,
    pub status: LineStatus,
    pub total_machines: usize,
    pub status_counts: StatusCounts,
    /// 运行设备占比 (百分比)
    pub efficiency: f64,
    pub machines: Vec<MachineStatusView>,
    pub last_updated: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryItem {
    pub status: MachineStatus,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransitionStat {
    pub status: MachineStatus,
    pub count: i64,
    pub total_duration: String,
    pub avg_duration: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransitionMetrics {
    pub period: Period,
    pub start_date: NaiveDateTime,
    pub transitions: Vec<StatusTransitionStat>,
}

// ==========================================
// 生产指标
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftProduction {
    pub shift: Shift,
    pub produced: i64,
    pub rejected: i64,
    pub quality_rate: f64,
    pub start_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealTimeMetrics {
    pub line_status: LineStatus,
    pub machines_running: usize,
    pub machines_total: usize,
    pub utilization_rate: f64,
    pub last_hour_production: i64,
    pub current_shift: ShiftProduction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachinePerformance {
    pub machine_id: i64,
    pub name: String,
    pub code: String,
    pub total_produced: i64,
    pub total_rejected: i64,
    pub avg_cycle_time: Option<f64>,
    pub production_runs: i64,
    pub efficiency: f64,
    pub current_status: MachineStatus,
    pub status_duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionTrendPoint {
    pub bucket: String,
    pub total_produced: i64,
    pub total_rejected: i64,
    pub machines_used: i64,
    pub avg_cycle_time: Option<f64>,
    pub efficiency: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_ratio_guards_zero_and_non_finite() {
        assert_eq!(safe_ratio(10.0, 0.0), 0.0);
        assert_eq!(safe_ratio(f64::INFINITY, 1.0), 0.0);
        assert_eq!(safe_ratio(1.0, 4.0), 0.25);
    }

    #[test]
    fn test_clamp_and_percent() {
        assert_eq!(clamp01(1.7), 1.0);
        assert_eq!(clamp01(-0.2), 0.0);
        assert_eq!(clamp01(f64::NAN), 0.0);
        assert_eq!(to_percent(0.968_75), 96.88);
        assert_eq!(round2(87.634_6), 87.63);
    }

    #[test]
    fn test_status_counts() {
        let mut counts = StatusCounts::default();
        counts.add(MachineStatus::Running);
        counts.add(MachineStatus::Running);
        counts.add(MachineStatus::Breakdown);
        assert_eq!(counts.running, 2);
        assert_eq!(counts.breakdown, 1);
        assert_eq!(counts.total(), 3);
    }
}
