// ==========================================
// 设备综合效率系统 - 实时状态概览
// ==========================================
// 职责: 产线状态快照 / 设备状态历史 / 状态切换统计
// 说明: 只读查询, 不参与状态切换事务
// ==========================================

use crate::domain::metrics::{
    round2, LineStatusOverview, MachineStatusView, StatusCounts, StatusHistoryItem,
    StatusTransitionMetrics, StatusTransitionStat,
};
use crate::domain::types::Period;
use crate::engine::clock::Clock;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::repositories::OeeRepositories;
use chrono::Duration;
use std::sync::Arc;

/// 秒数格式化: `45s` / `12m 5s` / `3h 20m`
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

pub struct StatusOverviewService {
    repos: OeeRepositories,
    clock: Arc<dyn Clock>,
}

impl StatusOverviewService {
    pub fn new(repos: OeeRepositories, clock: Arc<dyn Clock>) -> Self {
        Self { repos, clock }
    }

    /// 产线状态快照 (含停用设备)
    pub fn line_status(&self, line_id: i64) -> EngineResult<LineStatusOverview> {
        let line = self
            .repos
            .line_repo
            .find_by_id(line_id)?
            .ok_or_else(|| EngineError::not_found("ProductionLine", line_id))?;
        let now = self.clock.now();

        let mut counts = StatusCounts::default();
        let mut machines = Vec::new();
        for machine in self.repos.machine_repo.list_by_line(line_id)? {
            counts.add(machine.status);
            let open = self.repos.status_log_repo.find_open(machine.machine_id)?;
            let duration = open.as_ref().map(|e| e.elapsed_seconds(now)).unwrap_or(0);
            machines.push(MachineStatusView {
                machine_id: machine.machine_id,
                name: machine.name,
                code: machine.code,
                status: machine.status,
                status_duration: format_duration(duration),
                status_since: open.map(|e| e.started_at),
            });
        }

        let total = machines.len();
        let efficiency = if total > 0 {
            round2(counts.running as f64 / total as f64 * 100.0)
        } else {
            0.0
        };

        Ok(LineStatusOverview {
            line_id: line.line_id,
            name: line.name,
            status: line.status,
            total_machines: total,
            status_counts: counts,
            efficiency,
            machines,
            last_updated: now,
        })
    }

    /// 全部活跃产线的状态快照
    pub fn all_lines_status(&self) -> EngineResult<Vec<LineStatusOverview>> {
        self.repos
            .line_repo
            .list_active()?
            .into_iter()
            .map(|line| self.line_status(line.line_id))
            .collect()
    }

    /// 最近 `hours` 小时内开始的状态区间 (最新在前)
    pub fn machine_status_history(&self, machine_id: i64, hours: u32) -> EngineResult<Vec<StatusHistoryItem>> {
        self.repos.machine_repo.get(machine_id)?;
        let since = self.clock.now() - Duration::hours(hours as i64);

        Ok(self
            .repos
            .status_log_repo
            .history_since(machine_id, since)?
            .into_iter()
            .map(|entry| StatusHistoryItem {
                status: entry.status,
                started_at: entry.started_at,
                ended_at: entry.ended_at,
                duration: entry.duration.filter(|d| *d > 0).map(format_duration),
            })
            .collect())
    }

    /// 产线状态切换统计
    ///
    /// 百分比 = 该状态时长 / 全部状态时长; 全部时长为 0 时分母按 1 处理
    pub fn status_transition_metrics(&self, line_id: i64, period: Period) -> EngineResult<StatusTransitionMetrics> {
        if self.repos.line_repo.find_by_id(line_id)?.is_none() {
            return Err(EngineError::not_found("ProductionLine", line_id));
        }
        let start_date = period.start(self.clock.now());
        let rows = self
            .repos
            .status_log_repo
            .status_durations_for_line(line_id, start_date)?;

        let total_time = rows.iter().map(|r| r.total_duration).sum::<i64>().max(1);
        let transitions = rows
            .into_iter()
            .map(|row| StatusTransitionStat {
                status: row.status,
                count: row.count,
                total_duration: format_duration(row.total_duration),
                avg_duration: format_duration(row.avg_duration.round() as i64),
                percentage: round2(row.total_duration as f64 / total_time as f64 * 100.0),
            })
            .collect();

        Ok(StatusTransitionMetrics {
            period,
            start_date,
            transitions,
        })
    }
}
