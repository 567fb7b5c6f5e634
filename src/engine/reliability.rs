// ==========================================
// 设备综合效率系统 - 可靠性与停机分析
// ==========================================
// 职责:
// - MTBF (小时) / MTTR (分钟) 及其推导可用率
// - 停机按分类统计、帕累托分析 (原因 + 分类)
// - 进行中停机、停机历史
// 红线: 分母为 0 时返回 0, 不产生 NaN / Infinity
// ==========================================

use crate::config::ProductionConfig;
use crate::domain::ledger::DowntimeEntry;
use crate::domain::metrics::{
    round2, safe_ratio, CategoryStat, CurrentDowntime, ParetoItem, ParetoReport, ReliabilityMetrics,
};
use crate::domain::types::{MachineStatus, Period};
use crate::engine::clock::Clock;
use crate::engine::error::EngineResult;
use crate::engine::repositories::OeeRepositories;
use crate::perf::PerfGuard;
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::debug;

pub struct ReliabilityAnalyzer {
    repos: OeeRepositories,
    config: ProductionConfig,
    clock: Arc<dyn Clock>,
}

impl ReliabilityAnalyzer {
    pub fn new(repos: OeeRepositories, config: ProductionConfig, clock: Arc<dyn Clock>) -> Self {
        Self { repos, config, clock }
    }

    // ==========================================
    // MTBF / MTTR
    // ==========================================

    /// 平均故障间隔 (小时, 2 位小数)
    ///
    /// 窗口内开始的运行区间时长 / 窗口内开始的非计划停机次数 (含未结束);
    /// 无故障时返回 0
    pub fn mtbf(&self, machine_id: i64, start: NaiveDateTime, end: NaiveDateTime) -> EngineResult<f64> {
        self.repos.machine_repo.get(machine_id)?;

        let failures = self
            .repos
            .downtime_repo
            .unplanned_count_in_window(machine_id, start, end)?;
        if failures == 0 {
            return Ok(0.0);
        }

        let uptime = self
            .repos
            .status_log_repo
            .duration_started_in(machine_id, MachineStatus::Running, start, end)?;
        Ok(round2(safe_ratio(uptime as f64, failures as f64) / 3600.0))
    }

    /// 平均修复时间 (分钟, 2 位小数)
    ///
    /// 只统计窗口内开始且已关闭的非计划停机
    pub fn mttr(&self, machine_id: i64, start: NaiveDateTime, end: NaiveDateTime) -> EngineResult<f64> {
        self.repos.machine_repo.get(machine_id)?;

        let stats = self
            .repos
            .downtime_repo
            .closed_unplanned_stats(machine_id, start, end)?;
        if stats.count == 0 {
            return Ok(0.0);
        }
        Ok(round2(safe_ratio(stats.total_duration as f64, stats.count as f64) / 60.0))
    }

    /// MTBF + MTTR + 推导可用率
    pub fn reliability(&self, machine_id: i64, start: NaiveDateTime, end: NaiveDateTime) -> EngineResult<ReliabilityMetrics> {
        let mtbf_hours = self.mtbf(machine_id, start, end)?;
        let mttr_minutes = self.mttr(machine_id, start, end)?;
        let availability = availability_from_reliability(mtbf_hours, mttr_minutes);

        debug!(machine_id, mtbf_hours, mttr_minutes, availability, "可靠性指标计算完成");
        Ok(ReliabilityMetrics {
            machine_id,
            mtbf_hours,
            mttr_minutes,
            availability,
        })
    }

    pub fn reliability_for_period(&self, machine_id: i64, period: Period) -> EngineResult<ReliabilityMetrics> {
        let (start, end) = period.resolve(self.clock.now());
        self.reliability(machine_id, start, end)
    }

    // ==========================================
    // 停机分析
    // ==========================================

    /// 按分类统计停机 (周期起点之后开始且已关闭)
    pub fn category_stats(&self, line_id: Option<i64>, period: Period) -> EngineResult<Vec<CategoryStat>> {
        let since = period.start(self.clock.now());
        let rows = self.repos.downtime_repo.category_aggregate(line_id, since)?;
        let grand_total: i64 = rows.iter().map(|r| r.total_duration).sum();

        Ok(rows
            .into_iter()
            .map(|row| CategoryStat {
                category: row.category,
                count: row.count,
                total_duration: row.total_duration,
                avg_duration: row.avg_duration.round() as i64,
                min_duration: row.min_duration,
                max_duration: row.max_duration,
                percentage: percentage_of(row.total_duration, grand_total),
            })
            .collect())
    }

    /// 停机帕累托分析
    ///
    /// 取总时长最大的前 `pareto_limit` 组 (原因 + 分类); 百分比以这些组的合计为分母
    pub fn pareto(&self, line_id: Option<i64>, period: Period) -> EngineResult<ParetoReport> {
        let _perf = PerfGuard::new("downtime_pareto");

        let start_date = period.start(self.clock.now());
        let rows = self
            .repos
            .downtime_repo
            .pareto_rows(line_id, start_date, self.config.pareto_limit)?;
        let total_downtime: i64 = rows.iter().map(|r| r.total_duration).sum();

        let mut cumulative = 0.0;
        let data = rows
            .into_iter()
            .map(|row| {
                let percentage = if total_downtime > 0 {
                    row.total_duration as f64 / total_downtime as f64 * 100.0
                } else {
                    0.0
                };
                cumulative += percentage;
                ParetoItem {
                    reason: row.reason,
                    category: row.category,
                    frequency: row.frequency,
                    total_duration: row.total_duration,
                    avg_duration: row.avg_duration.round() as i64,
                    percentage: round2(percentage),
                    cumulative_percentage: round2(cumulative),
                }
            })
            .collect();

        Ok(ParetoReport {
            data,
            total_downtime,
            period,
            start_date,
        })
    }

    /// 进行中的停机 (已持续分钟数按当前时间计算)
    pub fn current_downtimes(&self, line_id: Option<i64>) -> EngineResult<Vec<CurrentDowntime>> {
        let now = self.clock.now();
        Ok(self
            .repos
            .downtime_repo
            .list_open(line_id)?
            .into_iter()
            .map(|row| CurrentDowntime {
                downtime_id: row.entry.downtime_id,
                machine_id: row.entry.machine_id,
                machine_name: row.machine_name,
                line_name: row.line_name,
                elapsed_minutes: (now - row.entry.started_at).num_minutes().max(0),
                reason: row.entry.reason,
                category: row.entry.category,
                started_at: row.entry.started_at,
                is_planned: row.entry.is_planned,
            })
            .collect())
    }

    /// 停机历史 (已关闭, 最新在前)
    ///
    /// 默认窗口: 本月初 → 当前时间
    pub fn downtime_history(
        &self,
        line_id: Option<i64>,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> EngineResult<Vec<DowntimeEntry>> {
        let now = self.clock.now();
        let start = start.unwrap_or_else(|| Period::Month.start(now));
        let end = end.unwrap_or(now);
        Ok(self.repos.downtime_repo.history(line_id, start, end)?)
    }
}

/// MTBF / (MTBF + MTTR) 百分比; MTBF 为 0 时为 0
///
/// 注意: 直接使用报表数值 (小时 / 分钟) 计算, 不做单位换算,
///       与既有看板口径保持一致
pub fn availability_from_reliability(mtbf_hours: f64, mttr_minutes: f64) -> f64 {
    if mtbf_hours <= 0.0 {
        return 0.0;
    }
    round2(safe_ratio(mtbf_hours, mtbf_hours + mttr_minutes) * 100.0)
}

fn percentage_of(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}
