// ==========================================
// 设备综合效率系统 - 班次边界
// ==========================================
// 职责: 根据配置的早/中/夜班起始小时解析当前班次窗口
// 默认: 早班 06:00 / 中班 14:00 / 夜班 22:00 (夜班跨日)
// ==========================================

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shift {
    Morning,
    Afternoon,
    Night,
}

impl Shift {
    pub const ALL: [Shift; 3] = [Shift::Morning, Shift::Afternoon, Shift::Night];

    pub fn as_str(&self) -> &'static str {
        match self {
            Shift::Morning => "morning",
            Shift::Afternoon => "afternoon",
            Shift::Night => "night",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "morning" => Some(Shift::Morning),
            "afternoon" => Some(Shift::Afternoon),
            "night" => Some(Shift::Night),
            _ => None,
        }
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 班次窗口 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftWindow {
    pub shift: Shift,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// 班次配置 (起始小时, 0-23)
///
/// 要求 morning < afternoon < night, 夜班从 night 跨日到次日 morning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftSchedule {
    pub morning_start: u32,
    pub afternoon_start: u32,
    pub night_start: u32,
}

impl Default for ShiftSchedule {
    fn default() -> Self {
        Self {
            morning_start: 6,
            afternoon_start: 14,
            night_start: 22,
        }
    }
}

impl ShiftSchedule {
    /// 校验起始小时是否递增且在 0-23 内
    pub fn is_valid(&self) -> bool {
        self.morning_start < self.afternoon_start
            && self.afternoon_start < self.night_start
            && self.night_start < 24
    }

    /// 解析 now 所在的班次窗口
    pub fn window_at(&self, now: NaiveDateTime) -> ShiftWindow {
        let hour = now.hour();
        let today = now.date();
        let at = |date: chrono::NaiveDate, h: u32| {
            date.and_time(NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN))
        };

        if hour >= self.morning_start && hour < self.afternoon_start {
            ShiftWindow {
                shift: Shift::Morning,
                start: at(today, self.morning_start),
                end: at(today, self.afternoon_start),
            }
        } else if hour >= self.afternoon_start && hour < self.night_start {
            ShiftWindow {
                shift: Shift::Afternoon,
                start: at(today, self.afternoon_start),
                end: at(today, self.night_start),
            }
        } else if hour >= self.night_start {
            ShiftWindow {
                shift: Shift::Night,
                start: at(today, self.night_start),
                end: at(today + Duration::days(1), self.morning_start),
            }
        } else {
            // 凌晨: 属于前一日开始的夜班
            ShiftWindow {
                shift: Shift::Night,
                start: at(today - Duration::days(1), self.night_start),
                end: at(today, self.morning_start),
            }
        }
    }

    /// 当前班次起点
    pub fn current_shift_start(&self, now: NaiveDateTime) -> NaiveDateTime {
        self.window_at(now).start
    }
}
