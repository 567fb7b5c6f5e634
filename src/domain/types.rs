// ==========================================
// 设备综合效率系统 - 领域类型定义
// ==========================================
// 职责: 设备状态 / 产线状态 / 停机分类 / 统计周期 / 班次
// 约束: 数据库存储统一使用小写字符串 (与 as_str 对齐)
// ==========================================

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 设备状态 (Machine Status)
// ==========================================
// 无终态: 设备可在四种状态间无限循环
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    Running,     // 运行
    Idle,        // 待机
    Maintenance, // 维护
    Breakdown,   // 故障
}

impl MachineStatus {
    pub const ALL: [MachineStatus; 4] = [
        MachineStatus::Running,
        MachineStatus::Idle,
        MachineStatus::Maintenance,
        MachineStatus::Breakdown,
    ];

    /// 转换为数据库存储的字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::Running => "running",
            MachineStatus::Idle => "idle",
            MachineStatus::Maintenance => "maintenance",
            MachineStatus::Breakdown => "breakdown",
        }
    }

    /// 从字符串解析 (未知值返回 None)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "running" => Some(MachineStatus::Running),
            "idle" => Some(MachineStatus::Idle),
            "maintenance" => Some(MachineStatus::Maintenance),
            "breakdown" => Some(MachineStatus::Breakdown),
            _ => None,
        }
    }

    /// 是否属于停机状态 (维护/故障)
    pub fn is_downtime(&self) -> bool {
        matches!(self, MachineStatus::Maintenance | MachineStatus::Breakdown)
    }
}

impl Default for MachineStatus {
    fn default() -> Self {
        MachineStatus::Idle
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 产线状态 (Line Status)
// ==========================================
// 派生值: 由成员设备状态计算, 不可直接设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStatus {
    Running,
    Maintenance,
    Idle,
    Stopped,
}

impl LineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineStatus::Running => "running",
            LineStatus::Maintenance => "maintenance",
            LineStatus::Idle => "idle",
            LineStatus::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "running" => Some(LineStatus::Running),
            "maintenance" => Some(LineStatus::Maintenance),
            "idle" => Some(LineStatus::Idle),
            "stopped" => Some(LineStatus::Stopped),
            _ => None,
        }
    }

    /// 由成员设备状态派生产线状态
    ///
    /// 规则 (按优先级):
    /// 1. 任一设备运行 → Running
    /// 2. 任一设备维护 → Maintenance
    /// 3. 有设备 → Idle
    /// 4. 无设备 → Stopped
    ///
    /// 注意: 故障设备不会把产线标为 Maintenance, 全部故障的产线为 Idle
    pub fn derive(machine_statuses: &[MachineStatus]) -> Self {
        if machine_statuses.contains(&MachineStatus::Running) {
            LineStatus::Running
        } else if machine_statuses.contains(&MachineStatus::Maintenance) {
            LineStatus::Maintenance
        } else if !machine_statuses.is_empty() {
            LineStatus::Idle
        } else {
            LineStatus::Stopped
        }
    }
}

impl fmt::Display for LineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 停机分类 (Downtime Category)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DowntimeCategory {
    Mechanical, // 机械
    Electrical, // 电气
    Material,   // 缺料
    Operator,   // 人员
    Changeover, // 换型
    Other,      // 其他
}

impl DowntimeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DowntimeCategory::Mechanical => "mechanical",
            DowntimeCategory::Electrical => "electrical",
            DowntimeCategory::Material => "material",
            DowntimeCategory::Operator => "operator",
            DowntimeCategory::Changeover => "changeover",
            DowntimeCategory::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mechanical" => Some(DowntimeCategory::Mechanical),
            "electrical" => Some(DowntimeCategory::Electrical),
            "material" => Some(DowntimeCategory::Material),
            "operator" => Some(DowntimeCategory::Operator),
            "changeover" => Some(DowntimeCategory::Changeover),
            "other" => Some(DowntimeCategory::Other),
            _ => None,
        }
    }

    /// 展示用标签
    pub fn label(&self) -> &'static str {
        match self {
            DowntimeCategory::Mechanical => "Mechanical Issues",
            DowntimeCategory::Electrical => "Electrical Issues",
            DowntimeCategory::Material => "Material Shortage",
            DowntimeCategory::Operator => "Operator Related",
            DowntimeCategory::Changeover => "Product Changeover",
            DowntimeCategory::Other => "Other",
        }
    }
}

impl fmt::Display for DowntimeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 统计周期 (Period)
// ==========================================
// 封闭集合: 未知字符串在边界层 (CLI/HTTP) 拒绝, 核心层只接受枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Hour => "hour",
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Quarter => "quarter",
            Period::Year => "year",
        }
    }

    /// 周期起点
    ///
    /// - Hour: now 前推 1 小时 (滚动窗口)
    /// - Day: 当日 00:00
    /// - Week: 本周一 00:00
    /// - Month / Quarter / Year: 自然月 / 季 / 年的首日 00:00
    pub fn start(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date();
        match self {
            Period::Hour => now - Duration::hours(1),
            Period::Day => start_of_day(today),
            Period::Week => {
                let offset = today.weekday().num_days_from_monday() as i64;
                start_of_day(today - Duration::days(offset))
            }
            Period::Month => first_day(today.year(), today.month()),
            Period::Quarter => {
                let quarter_month = ((today.month() - 1) / 3) * 3 + 1;
                first_day(today.year(), quarter_month)
            }
            Period::Year => first_day(today.year(), 1),
        }
    }

    /// 解析周期窗口 [start, now]
    pub fn resolve(&self, now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        (self.start(now), now)
    }

    /// 窗口内的整日数; 为 0 时计划生产时间为 0, 可用率与 OEE 恒为 0
    pub fn whole_days(&self, now: NaiveDateTime) -> i64 {
        let (start, end) = self.resolve(now);
        days_between(start, end)
    }

    /// 产量趋势分桶格式 (SQLite strftime)
    pub fn trend_bucket_format(&self) -> &'static str {
        match self {
            Period::Hour | Period::Day => "%Y-%m-%d %H:00:00",
            Period::Week | Period::Month => "%Y-%m-%d",
            Period::Quarter | Period::Year => "%Y-%m",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hour" => Ok(Period::Hour),
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "quarter" => Ok(Period::Quarter),
            "year" => Ok(Period::Year),
            other => Err(format!("未知统计周期: {}", other)),
        }
    }
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn first_day(year: i32, month: u32) -> NaiveDateTime {
    // month 由上面的计算保证在 1..=12
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(start_of_day)
        .unwrap_or(NaiveDateTime::MIN)
}

/// 两个时间点之间完整经过的天数 (向下取整, 与顺序无关)
pub fn days_between(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    (end - start).num_days().abs()
}
