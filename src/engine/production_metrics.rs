// ==========================================
// 设备综合效率系统 - 生产指标
// ==========================================
// 职责:
// - 产出登记 (数量 / 排产计划校验, 提交后发出产出通知)
// - 产线实时指标 (运行设备 / 利用率 / 近一小时产量 / 当班产量)
// - 设备产出对比、产量趋势
// ==========================================

use crate::config::ProductionConfig;
use crate::domain::ledger::{NewProductionOutput, OutputTotals, ProductionOutput};
use crate::domain::metrics::{
    round2, MachinePerformance, ProductionTrendPoint, RealTimeMetrics, ShiftProduction,
};
use crate::domain::schedule::ScheduleStatus;
use crate::domain::types::{MachineStatus, Period};
use crate::engine::clock::Clock;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{OeeEventNotifier, OptionalNotifier, ProductionOutputRecorded};
use crate::engine::repositories::OeeRepositories;
use chrono::Duration;
use std::sync::Arc;
use tracing::info;

/// 良品率百分比; 产量为 0 时为 0
fn good_rate_percent(produced: i64, rejected: i64) -> f64 {
    if produced <= 0 {
        return 0.0;
    }
    round2((produced - rejected) as f64 / produced as f64 * 100.0)
}

pub struct ProductionMetricsEngine {
    repos: OeeRepositories,
    config: ProductionConfig,
    clock: Arc<dyn Clock>,
    notifier: OptionalNotifier,
}

impl ProductionMetricsEngine {
    pub fn new(repos: OeeRepositories, config: ProductionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            repos,
            config,
            clock,
            notifier: OptionalNotifier::none(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn OeeEventNotifier>) -> Self {
        self.notifier = OptionalNotifier::with_notifier(notifier);
        self
    }

    /// 登记产出
    ///
    /// # 校验
    /// - quantity_produced >= 1
    /// - 0 <= quantity_rejected <= quantity_produced
    /// - cycle_time 若提供必须为正数
    /// - production_schedule_id 若提供, 计划必须存在、属于设备所在产线且未取消
    pub fn record_output(&self, output: &NewProductionOutput) -> EngineResult<ProductionOutput> {
        if output.quantity_produced < 1 {
            return Err(EngineError::validation(format!(
                "产量必须 >= 1: {}",
                output.quantity_produced
            )));
        }
        if output.quantity_rejected < 0 || output.quantity_rejected > output.quantity_produced {
            return Err(EngineError::validation(format!(
                "不良数必须在 0..={} 之间: {}",
                output.quantity_produced, output.quantity_rejected
            )));
        }
        if let Some(cycle) = output.cycle_time {
            if !(cycle.is_finite() && cycle > 0.0) {
                return Err(EngineError::validation(format!("节拍必须为正数: {}", cycle)));
            }
        }
        let machine = self.repos.machine_repo.get(output.machine_id)?;
        if let Some(schedule_id) = output.production_schedule_id {
            let schedule = self
                .repos
                .schedule_repo
                .find_by_id(schedule_id)?
                .ok_or_else(|| EngineError::not_found("ProductionSchedule", schedule_id))?;
            if schedule.production_line_id != machine.production_line_id {
                return Err(EngineError::validation(format!(
                    "排产计划 {} 不属于设备所在产线 {}",
                    schedule_id, machine.production_line_id
                )));
            }
            if schedule.status == ScheduleStatus::Cancelled {
                return Err(EngineError::validation(format!("排产计划 {} 已取消", schedule_id)));
            }
        }

        let saved = self.repos.output_repo.insert(output)?;
        info!(
            output_id = saved.output_id,
            machine_id = saved.machine_id,
            schedule_id = ?saved.production_schedule_id,
            produced = saved.quantity_produced,
            rejected = saved.quantity_rejected,
            "产出已登记"
        );

        self.notifier.notify_output(&ProductionOutputRecorded::new(
            &saved,
            &machine.name,
            machine.production_line_id,
        ));
        Ok(saved)
    }

    /// 单机窗口内产出合计
    pub fn machine_totals(
        &self,
        machine_id: i64,
        start: chrono::NaiveDateTime,
        end: chrono::NaiveDateTime,
    ) -> EngineResult<OutputTotals> {
        self.repos.machine_repo.get(machine_id)?;
        Ok(self.repos.output_repo.totals_in_window(machine_id, start, end)?)
    }

    /// 产线实时指标
    pub fn real_time_metrics(&self, line_id: i64) -> EngineResult<RealTimeMetrics> {
        let line = self
            .repos
            .line_repo
            .find_by_id(line_id)?
            .ok_or_else(|| EngineError::not_found("ProductionLine", line_id))?;
        let now = self.clock.now();

        let machines = self.repos.machine_repo.list_by_line(line_id)?;
        let machines_total = machines.len();
        let machines_running = machines
            .iter()
            .filter(|m| m.status == MachineStatus::Running)
            .count();
        let utilization_rate = if machines_total > 0 {
            round2(machines_running as f64 / machines_total as f64 * 100.0)
        } else {
            0.0
        };

        let last_hour = self
            .repos
            .output_repo
            .line_totals_since(line_id, now - Duration::hours(1))?;

        let shift = self.config.shifts.window_at(now);
        let shift_totals = self.repos.output_repo.line_totals_since(line_id, shift.start)?;

        Ok(RealTimeMetrics {
            line_status: line.status,
            machines_running,
            machines_total,
            utilization_rate,
            last_hour_production: last_hour.produced,
            current_shift: ShiftProduction {
                shift: shift.shift,
                produced: shift_totals.produced,
                rejected: shift_totals.rejected,
                quality_rate: good_rate_percent(shift_totals.produced, shift_totals.rejected),
                start_time: shift.start,
            },
        })
    }

    /// 设备产出对比 (按总产量降序)
    pub fn machine_performance(&self, line_id: i64, period: Period) -> EngineResult<Vec<MachinePerformance>> {
        let now = self.clock.now();
        let since = period.start(now);

        let rows = self.repos.output_repo.machine_performance_rows(line_id, since)?;
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let machine = self.repos.machine_repo.get(row.machine_id)?;
            let status_duration = self
                .repos
                .status_log_repo
                .current_status_duration(row.machine_id, now)?;
            result.push(MachinePerformance {
                machine_id: row.machine_id,
                efficiency: good_rate_percent(row.total_produced, row.total_rejected),
                name: row.name,
                code: row.code,
                total_produced: row.total_produced,
                total_rejected: row.total_rejected,
                avg_cycle_time: row.avg_cycle_time.map(round2),
                production_runs: row.production_runs,
                current_status: machine.status,
                status_duration,
            });
        }
        Ok(result)
    }

    /// 产量趋势; 分桶粒度随周期变化 (日→小时, 周/月→天, 季/年→月)
    pub fn production_trends(&self, line_id: i64, period: Period) -> EngineResult<Vec<ProductionTrendPoint>> {
        let since = period.start(self.clock.now());
        let rows = self
            .repos
            .output_repo
            .trend_rows(line_id, since, period.trend_bucket_format())?;

        Ok(rows
            .into_iter()
            .map(|row| ProductionTrendPoint {
                efficiency: good_rate_percent(row.total_produced, row.total_rejected),
                bucket: row.bucket,
                total_produced: row.total_produced,
                total_rejected: row.total_rejected,
                machines_used: row.machines_used,
                avg_cycle_time: row.avg_cycle_time.map(round2),
            })
            .collect())
    }
}
