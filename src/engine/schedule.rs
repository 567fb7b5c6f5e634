// ==========================================
// 设备综合效率系统 - 排产计划引擎
// ==========================================
// 职责:
// - 计划维护: 新建 / 开工 / 完工 / 取消 / 进度更新 (达到计划数量自动完工)
// - 计划看板: 今日 / 明日 / 本周 / 下周分组, 当前计划与后续计划
// - 计划对比: 计划 vs 实际, 班次达成分析, 超期计划
// 红线: 状态变更在 Immediate 事务内读取并写回, 时间在持锁后读取
// ==========================================

use crate::domain::metrics::{round2, safe_ratio};
use crate::domain::schedule::{
    CurrentSchedule, DelayedSchedule, NewProductionSchedule, PlannedVsActual, ProductionSchedule,
    ScheduleFilter, ScheduleOverview, ScheduleStatus, ScheduleStatusBoard, ScheduleSummary,
    ShiftAnalysis, ShiftPlanPerformance,
};
use crate::domain::shift::Shift;
use crate::domain::types::Period;
use crate::engine::clock::Clock;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::repositories::OeeRepositories;
use crate::repository::{ProductionScheduleRepository, RepositoryError};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use rusqlite::TransactionBehavior;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 看板中后续 / 最近完工计划的条数
pub const SCHEDULE_BOARD_LIMIT: usize = 5;

/// 班次分析允许的回溯天数
pub const SHIFT_ANALYSIS_MAX_DAYS: i64 = 90;

pub struct ProductionScheduleEngine {
    repos: OeeRepositories,
    clock: Arc<dyn Clock>,
}

impl ProductionScheduleEngine {
    pub fn new(repos: OeeRepositories, clock: Arc<dyn Clock>) -> Self {
        Self { repos, clock }
    }

    fn ensure_line(&self, line_id: Option<i64>) -> EngineResult<()> {
        if let Some(id) = line_id {
            if self.repos.line_repo.find_by_id(id)?.is_none() {
                return Err(EngineError::not_found("ProductionLine", id));
            }
        }
        Ok(())
    }

    // ==========================================
    // 计划维护
    // ==========================================

    /// 新建计划
    ///
    /// # 校验
    /// - 产品名称与编码非空
    /// - planned_quantity >= 1
    /// - scheduled_end 晚于 scheduled_start
    pub fn create_schedule(&self, schedule: &NewProductionSchedule) -> EngineResult<ProductionSchedule> {
        if schedule.product_name.trim().is_empty() || schedule.product_code.trim().is_empty() {
            return Err(EngineError::validation("产品名称与编码不能为空"));
        }
        if schedule.planned_quantity < 1 {
            return Err(EngineError::validation(format!(
                "计划数量必须 >= 1: {}",
                schedule.planned_quantity
            )));
        }
        if schedule.scheduled_end <= schedule.scheduled_start {
            return Err(EngineError::validation(format!(
                "计划完工时间 {} 必须晚于计划开工时间 {}",
                schedule.scheduled_end, schedule.scheduled_start
            )));
        }
        self.ensure_line(Some(schedule.production_line_id))?;

        let created = self.repos.schedule_repo.insert(schedule)?;
        info!(
            schedule_id = created.schedule_id,
            line_id = created.production_line_id,
            planned = created.planned_quantity,
            "排产计划已创建"
        );
        Ok(created)
    }

    pub fn list_schedules(&self, filter: &ScheduleFilter) -> EngineResult<Vec<ProductionSchedule>> {
        self.ensure_line(filter.line_id)?;
        Ok(self.repos.schedule_repo.list(filter)?)
    }

    /// 在 Immediate 事务内读取计划、应用变更并写回
    fn transition<F>(&self, schedule_id: i64, apply: F) -> EngineResult<ProductionSchedule>
    where
        F: FnOnce(&mut ProductionSchedule, NaiveDateTime) -> EngineResult<()>,
    {
        let mut conn = self
            .repos
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = self.clock.now();

        let mut schedule = ProductionScheduleRepository::find_by_id_in(&tx, schedule_id)?
            .ok_or_else(|| EngineError::not_found("ProductionSchedule", schedule_id))?;
        let previous = schedule.status;
        if let Err(e) = apply(&mut schedule, now) {
            warn!(schedule_id, status = %previous, error = %e, "排产计划变更被拒绝");
            return Err(e);
        }
        ProductionScheduleRepository::save_progress_in(&tx, &schedule)?;
        tx.commit()?;

        info!(
            schedule_id,
            from = %previous,
            to = %schedule.status,
            actual = schedule.actual_quantity,
            "排产计划已更新"
        );
        Ok(schedule)
    }

    /// 开工: pending → in_progress, 记录实际开工时间
    #[instrument(skip(self))]
    pub fn start_schedule(&self, schedule_id: i64) -> EngineResult<ProductionSchedule> {
        self.transition(schedule_id, |schedule, now| {
            require_status(schedule, ScheduleStatus::Pending, "开工")?;
            schedule.status = ScheduleStatus::InProgress;
            schedule.actual_start = Some(now);
            Ok(())
        })
    }

    /// 完工: in_progress → completed, 记录实际完工时间
    #[instrument(skip(self))]
    pub fn complete_schedule(&self, schedule_id: i64) -> EngineResult<ProductionSchedule> {
        self.transition(schedule_id, |schedule, now| {
            require_status(schedule, ScheduleStatus::InProgress, "完工")?;
            schedule.status = ScheduleStatus::Completed;
            schedule.actual_end = Some(now);
            Ok(())
        })
    }

    /// 取消未关闭的计划
    #[instrument(skip(self))]
    pub fn cancel_schedule(&self, schedule_id: i64) -> EngineResult<ProductionSchedule> {
        self.transition(schedule_id, |schedule, _now| {
            if schedule.status.is_closed() {
                return Err(EngineError::InvalidScheduleTransition {
                    schedule_id: schedule.schedule_id,
                    reason: format!("{} 状态的计划不能取消", schedule.status),
                });
            }
            schedule.status = ScheduleStatus::Cancelled;
            Ok(())
        })
    }

    /// 更新实际数量; 达到计划数量时自动完工
    #[instrument(skip(self))]
    pub fn update_progress(&self, schedule_id: i64, actual_quantity: i64) -> EngineResult<ProductionSchedule> {
        if actual_quantity < 0 {
            return Err(EngineError::validation(format!(
                "实际数量必须 >= 0: {}",
                actual_quantity
            )));
        }
        self.transition(schedule_id, |schedule, now| {
            require_status(schedule, ScheduleStatus::InProgress, "更新进度")?;
            schedule.actual_quantity = actual_quantity;
            if schedule.actual_quantity >= schedule.planned_quantity {
                schedule.status = ScheduleStatus::Completed;
                schedule.actual_end = Some(now);
            }
            Ok(())
        })
    }

    // ==========================================
    // 计划看板
    // ==========================================

    /// 未关闭计划按开工时间分组 (周一为一周起点)
    pub fn schedule_overview(&self, line_id: Option<i64>) -> EngineResult<ScheduleOverview> {
        self.ensure_line(line_id)?;
        let now = self.clock.now();
        let today = now.date();
        let tomorrow = today + Duration::days(1);
        let week_start = Period::Week.start(now);
        let next_week_start = week_start + Duration::days(7);
        let next_week_end = next_week_start + Duration::days(7);

        let mut overview = ScheduleOverview::default();
        for schedule in self.repos.schedule_repo.list_open(line_id)? {
            let start = schedule.scheduled_start;
            if start.date() == today {
                overview.today.push(schedule.clone());
            }
            if start.date() == tomorrow {
                overview.tomorrow.push(schedule.clone());
            }
            if start >= week_start && start < next_week_start {
                overview.this_week.push(schedule.clone());
            }
            if start >= next_week_start && start < next_week_end {
                overview.next_week.push(schedule);
            }
        }
        Ok(overview)
    }

    /// 当前计划 / 后续计划 / 最近完工计划
    pub fn schedule_status(&self, line_id: Option<i64>) -> EngineResult<ScheduleStatusBoard> {
        self.ensure_line(line_id)?;
        let now = self.clock.now();

        let current = match self.repos.schedule_repo.find_current(line_id)? {
            Some(schedule) => {
                let recorded = self.repos.output_repo.totals_for_schedule(schedule.schedule_id)?;
                Some(CurrentSchedule {
                    completion_percentage: schedule.completion_percentage(),
                    time_elapsed: schedule
                        .actual_start
                        .map(|started| (now - started).num_minutes())
                        .unwrap_or(0),
                    time_remaining: (schedule.scheduled_end - now).num_minutes(),
                    recorded_produced: recorded.produced,
                    recorded_rejected: recorded.rejected,
                    schedule,
                })
            }
            None => None,
        };

        Ok(ScheduleStatusBoard {
            current,
            upcoming: self
                .repos
                .schedule_repo
                .list_upcoming(line_id, now, SCHEDULE_BOARD_LIMIT)?,
            recent_completed: self
                .repos
                .schedule_repo
                .list_recent_completed(line_id, SCHEDULE_BOARD_LIMIT)?,
        })
    }

    // ==========================================
    // 计划对比
    // ==========================================

    /// 周期内开工计划的计划数量 vs 实际数量
    pub fn planned_vs_actual(&self, line_id: Option<i64>, period: Period) -> EngineResult<PlannedVsActual> {
        self.ensure_line(line_id)?;
        let start_date = period.start(self.clock.now());
        let schedules = self.repos.schedule_repo.list_since(line_id, start_date)?;

        let count = |status: ScheduleStatus| schedules.iter().filter(|s| s.status == status).count() as i64;
        let total_planned_quantity: i64 = schedules.iter().map(|s| s.planned_quantity).sum();
        let total_actual_quantity: i64 = schedules.iter().map(|s| s.actual_quantity).sum();

        let summary = ScheduleSummary {
            total_schedules: schedules.len() as i64,
            completed: count(ScheduleStatus::Completed),
            in_progress: count(ScheduleStatus::InProgress),
            pending: count(ScheduleStatus::Pending),
            cancelled: count(ScheduleStatus::Cancelled),
            total_planned_quantity,
            total_actual_quantity,
            achievement_rate: round2(
                safe_ratio(total_actual_quantity as f64, total_planned_quantity as f64) * 100.0,
            ),
        };

        Ok(PlannedVsActual {
            summary,
            daily: self.repos.schedule_repo.daily_plan_rows(line_id, start_date)?,
            period,
            start_date,
        })
    }

    /// 近 days 天各班次计划达成 (1..=90 天)
    pub fn shift_analysis(&self, line_id: Option<i64>, days: i64) -> EngineResult<ShiftAnalysis> {
        if !(1..=SHIFT_ANALYSIS_MAX_DAYS).contains(&days) {
            return Err(EngineError::validation(format!(
                "回溯天数必须在 1..={} 之间: {}",
                SHIFT_ANALYSIS_MAX_DAYS, days
            )));
        }
        self.ensure_line(line_id)?;
        let start_date = (self.clock.now() - Duration::days(days)).date().and_time(NaiveTime::MIN);
        let rows = self.repos.schedule_repo.shift_plan_rows(line_id, start_date)?;

        let shift_performance: Vec<ShiftPlanPerformance> = Shift::ALL
            .iter()
            .map(|&shift| match rows.iter().find(|r| r.shift == shift) {
                Some(row) => ShiftPlanPerformance {
                    shift,
                    schedule_count: row.schedule_count,
                    total_planned: row.total_planned,
                    total_actual: row.total_actual,
                    avg_achievement: round2(row.avg_achievement),
                },
                None => ShiftPlanPerformance {
                    shift,
                    schedule_count: 0,
                    total_planned: 0,
                    total_actual: 0,
                    avg_achievement: 0.0,
                },
            })
            .collect();

        Ok(ShiftAnalysis {
            best_shift: best_shift(&shift_performance),
            shift_performance,
            period_days: days,
            start_date,
        })
    }

    /// 生产中且已超过计划完工时间的计划
    pub fn delayed_schedules(&self, line_id: Option<i64>) -> EngineResult<Vec<DelayedSchedule>> {
        self.ensure_line(line_id)?;
        let now = self.clock.now();
        let rows = self.repos.schedule_repo.list_delayed(line_id, now)?;

        Ok(rows
            .into_iter()
            .map(|row| DelayedSchedule {
                schedule_id: row.schedule.schedule_id,
                delay_hours: (now - row.schedule.scheduled_end).num_hours(),
                completion_percentage: row.schedule.completion_percentage(),
                remaining_quantity: row.schedule.remaining_quantity(),
                scheduled_end: row.schedule.scheduled_end,
                product_name: row.schedule.product_name,
                product_code: row.schedule.product_code,
                line_name: row.line_name,
            })
            .collect())
    }
}

fn require_status(schedule: &ProductionSchedule, expected: ScheduleStatus, action: &str) -> EngineResult<()> {
    if schedule.status != expected {
        return Err(EngineError::InvalidScheduleTransition {
            schedule_id: schedule.schedule_id,
            reason: format!("{}要求状态为 {}, 当前为 {}", action, expected, schedule.status),
        });
    }
    Ok(())
}

/// 平均达成率最高的班次; 并列时取先出现者, 无计划时为 None
fn best_shift(performance: &[ShiftPlanPerformance]) -> Option<Shift> {
    let mut best: Option<&ShiftPlanPerformance> = None;
    for item in performance.iter().filter(|p| p.schedule_count > 0) {
        match best {
            Some(current) if current.avg_achievement >= item.avg_achievement => {}
            _ => best = Some(item),
        }
    }
    best.map(|p| p.shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perf(shift: Shift, count: i64, avg: f64) -> ShiftPlanPerformance {
        ShiftPlanPerformance {
            shift,
            schedule_count: count,
            total_planned: 0,
            total_actual: 0,
            avg_achievement: avg,
        }
    }

    #[test]
    fn test_best_shift_prefers_first_on_ties() {
        let items = vec![
            perf(Shift::Morning, 2, 80.0),
            perf(Shift::Afternoon, 1, 95.0),
            perf(Shift::Night, 3, 95.0),
        ];
        assert_eq!(best_shift(&items), Some(Shift::Afternoon));
    }

    #[test]
    fn test_best_shift_ignores_empty_shifts() {
        let items = vec![
            perf(Shift::Morning, 0, 0.0),
            perf(Shift::Afternoon, 0, 0.0),
            perf(Shift::Night, 1, 0.0),
        ];
        assert_eq!(best_shift(&items), Some(Shift::Night));
        assert_eq!(best_shift(&items[..2]), None);
    }
}
