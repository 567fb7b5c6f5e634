// ==========================================
// 设备综合效率系统 - 时钟
// ==========================================
// 引擎不直接读取系统时间, 统一经由注入的 Clock
// ==========================================

use chrono::{NaiveDateTime, Timelike, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    /// 当前时间 (秒精度)
    fn now(&self) -> NaiveDateTime;
}

/// 系统时钟 (UTC)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now = Utc::now().naive_utc();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// 手动时钟, 测试与回放使用
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn set(&self, value: NaiveDateTime) {
        match self.current.lock() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        match self.current.lock() {
            Ok(mut guard) => *guard += delta,
            Err(poisoned) => *poisoned.into_inner() += delta,
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        match self.current.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_manual_clock_advance() {
        let start = NaiveDateTime::parse_from_str("2025-01-01 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), start + Duration::minutes(90));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_system_clock_has_second_precision() {
        assert_eq!(SystemClock.now().nanosecond(), 0);
    }
}
