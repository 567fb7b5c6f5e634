// ==========================================
// 设备综合效率系统 - OEE 计算引擎
// ==========================================
// 公式:
// - 计划生产时间 = 整天数 × 每日计划工时 × 3600
// - 可用率 = (计划生产时间 - 非计划停机) / 计划生产时间
// - 性能率 = 总产量 / (运行时间 / 理想节拍)
// - 质量率 = 良品数 / 总产量
// - OEE = 可用率 × 性能率 × 质量率
// 红线:
// - 四项比率均截断到 [0, 1], 分母为 0 时取 0
// - 运行时间沿用状态台账的跨边界计入口径 (不裁剪), 因此原始比率可能 > 1
// - 产线 OEE 为活跃设备百分比结果的算术平均, 无活跃设备时返回全零结果
// ==========================================

use crate::config::ProductionConfig;
use crate::domain::machine::Machine;
use crate::domain::metrics::{
    clamp01, round2, safe_ratio, to_percent, LineOeeResult, MachineOeeSummary, OeeDetails,
    OeeResult, PlantOeeResult,
};
use crate::domain::types::{days_between, MachineStatus, Period};
use crate::engine::clock::Clock;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::repositories::OeeRepositories;
use crate::perf::PerfGuard;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

// ==========================================
// 纯计算部分
// ==========================================

/// OEE 计算输入 (时间单位: 秒)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OeeInputs {
    pub planned_production_time: i64,
    pub unplanned_downtime: i64,
    pub run_time: i64,
    pub ideal_cycle_time: f64,
    pub total_produced: i64,
    pub rejected: i64,
}

/// OEE 四项比率 (0-1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OeeRatios {
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub oee: f64,
}

impl OeeInputs {
    pub fn ratios(&self) -> OeeRatios {
        let planned = self.planned_production_time as f64;
        let availability = if self.planned_production_time <= 0 {
            0.0
        } else {
            clamp01(safe_ratio(planned - self.unplanned_downtime as f64, planned))
        };

        let performance = if self.run_time <= 0 {
            0.0
        } else {
            let theoretical_output = safe_ratio(self.run_time as f64, self.ideal_cycle_time);
            if theoretical_output <= 0.0 {
                0.0
            } else {
                clamp01(safe_ratio(self.total_produced as f64, theoretical_output))
            }
        };

        let quality = if self.total_produced <= 0 {
            0.0
        } else {
            let good = (self.total_produced - self.rejected) as f64;
            clamp01(safe_ratio(good, self.total_produced as f64))
        };

        OeeRatios {
            availability,
            performance,
            quality,
            oee: clamp01(availability * performance * quality),
        }
    }
}

/// 计划生产时间 (秒)
pub fn planned_production_time(start: NaiveDateTime, end: NaiveDateTime, working_hours_per_day: u32) -> i64 {
    days_between(start, end) * working_hours_per_day as i64 * 3600
}

// ==========================================
// OeeCalculator - OEE 计算引擎
// ==========================================
pub struct OeeCalculator {
    repos: OeeRepositories,
    config: ProductionConfig,
    clock: Arc<dyn Clock>,
}

impl OeeCalculator {
    pub fn new(repos: OeeRepositories, config: ProductionConfig, clock: Arc<dyn Clock>) -> Self {
        Self { repos, config, clock }
    }

    pub fn config(&self) -> &ProductionConfig {
        &self.config
    }

    /// 单机 OEE
    ///
    /// # 参数
    /// - `machine_id`: 设备 ID
    /// - `start` / `end`: 统计窗口
    pub fn machine_oee(&self, machine_id: i64, start: NaiveDateTime, end: NaiveDateTime) -> EngineResult<OeeResult> {
        let machine = self.repos.machine_repo.get(machine_id)?;
        self.compute_for(&machine, start, end)
    }

    /// 按统计周期计算单机 OEE (窗口终点为当前时间)
    pub fn machine_oee_for_period(&self, machine_id: i64, period: Period) -> EngineResult<OeeResult> {
        let (start, end) = period.resolve(self.clock.now());
        self.machine_oee(machine_id, start, end)
    }

    fn compute_for(&self, machine: &Machine, start: NaiveDateTime, end: NaiveDateTime) -> EngineResult<OeeResult> {
        let downtime_repo = &self.repos.downtime_repo;
        let machine_id = machine.machine_id;

        let planned = planned_production_time(start, end, self.config.working_hours_per_day);
        let unplanned_downtime = downtime_repo.unplanned_total_in_window(machine_id, start, end)?;
        let downtime = downtime_repo.total_in_window(machine_id, start, end, false)?;
        let run_time = self
            .repos
            .status_log_repo
            .run_time(machine_id, MachineStatus::Running, start, end)?;
        let totals = self.repos.output_repo.totals_in_window(machine_id, start, end)?;

        let inputs = OeeInputs {
            planned_production_time: planned,
            unplanned_downtime,
            run_time,
            ideal_cycle_time: machine.ideal_cycle_time,
            total_produced: totals.produced,
            rejected: totals.rejected,
        };
        let ratios = inputs.ratios();

        debug!(
            machine_id,
            planned,
            run_time,
            unplanned_downtime,
            produced = totals.produced,
            oee = ratios.oee,
            "单机 OEE 计算完成"
        );

        Ok(OeeResult {
            machine_id,
            oee: to_percent(ratios.oee),
            availability: to_percent(ratios.availability),
            performance: to_percent(ratios.performance),
            quality: to_percent(ratios.quality),
            details: OeeDetails {
                planned_production_time: planned,
                run_time,
                downtime,
                unplanned_downtime,
                total_produced: totals.produced,
                good_parts: totals.good(),
                rejected_parts: totals.rejected,
            },
        })
    }

    /// 产线 OEE (活跃设备平均)
    #[instrument(skip(self))]
    pub fn line_oee(&self, line_id: i64, start: NaiveDateTime, end: NaiveDateTime) -> EngineResult<LineOeeResult> {
        let _perf = PerfGuard::new("line_oee");

        if self.repos.line_repo.find_by_id(line_id)?.is_none() {
            return Err(EngineError::not_found("ProductionLine", line_id));
        }

        let machines = self.repos.machine_repo.list_active_by_line(line_id)?;
        if machines.is_empty() {
            return Ok(LineOeeResult::empty(Some(line_id)));
        }

        let mut results = Vec::with_capacity(machines.len());
        for machine in &machines {
            results.push((machine, self.compute_for(machine, start, end)?));
        }

        let n = results.len() as f64;
        let mean = |f: fn(&OeeResult) -> f64| round2(results.iter().map(|(_, r)| f(r)).sum::<f64>() / n);

        Ok(LineOeeResult {
            line_id: Some(line_id),
            oee: mean(|r| r.oee),
            availability: mean(|r| r.availability),
            performance: mean(|r| r.performance),
            quality: mean(|r| r.quality),
            machine_count: results.len(),
            machines: results
                .iter()
                .map(|(machine, r)| MachineOeeSummary {
                    machine_id: machine.machine_id,
                    machine_name: machine.name.clone(),
                    oee: r.oee,
                })
                .collect(),
        })
    }

    pub fn line_oee_for_period(&self, line_id: i64, period: Period) -> EngineResult<LineOeeResult> {
        let (start, end) = period.resolve(self.clock.now());
        self.line_oee(line_id, start, end)
    }

    /// 全厂 OEE: 有活跃设备的活跃产线平均
    pub fn plant_oee(&self, start: NaiveDateTime, end: NaiveDateTime) -> EngineResult<PlantOeeResult> {
        let _perf = PerfGuard::new("plant_oee");

        let mut line_results = Vec::new();
        for line in self.repos.line_repo.list_active()? {
            let result = self.line_oee(line.line_id, start, end)?;
            if result.machine_count > 0 {
                line_results.push(result);
            }
        }

        if line_results.is_empty() {
            return Ok(PlantOeeResult {
                oee: 0.0,
                availability: 0.0,
                performance: 0.0,
                quality: 0.0,
                line_count: 0,
            });
        }

        let n = line_results.len() as f64;
        let mean = |f: fn(&LineOeeResult) -> f64| round2(line_results.iter().map(f).sum::<f64>() / n);
        Ok(PlantOeeResult {
            oee: mean(|r| r.oee),
            availability: mean(|r| r.availability),
            performance: mean(|r| r.performance),
            quality: mean(|r| r.quality),
            line_count: line_results.len(),
        })
    }
}
