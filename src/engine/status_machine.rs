// ==========================================
// 设备综合效率系统 - 设备状态机
// ==========================================
// 职责: 编排设备状态切换, 保证状态台账 / 停机台账 / 设备缓存状态 /
//       产线派生状态在同一事务内一致更新
// 红线:
// - 切换规则集中在 TransitionEffects::resolve, 不在调用点分散判断
// - 校验失败时不得产生任何台账写入
// - 通知在提交后发出, 投递失败不影响切换结果
// ==========================================

use crate::domain::ledger::{DowntimeEntry, NewDowntime, StatusLogEntry};
use crate::domain::machine::{Machine, NewMachine, ProductionLine};
use crate::domain::types::{DowntimeCategory, LineStatus, MachineStatus};
use crate::engine::clock::Clock;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{MachineStatusChanged, OptionalNotifier, OeeEventNotifier};
use crate::engine::repositories::OeeRepositories;
use crate::repository::{
    DowntimeRepository, MachineRepository, ProductionLineRepository, RepositoryError,
    StatusLogRepository,
};
use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

// ==========================================
// 切换表
// ==========================================

/// (当前状态, 目标状态) 对应的副作用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEffects {
    /// 关闭当前未结束停机
    pub close_downtime: bool,
    /// 开启新停机
    pub open_downtime: bool,
    /// 必须提供停机原因与分类
    pub requires_reason: bool,
}

impl TransitionEffects {
    /// 解析切换副作用
    ///
    /// | from \ to          | Running/Idle | Maintenance/Breakdown |
    /// |--------------------|--------------|-----------------------|
    /// | Running/Idle       | -            | open                  |
    /// | Maintenance/Breakdown | close     | close + open          |
    pub fn resolve(from: MachineStatus, to: MachineStatus) -> Self {
        Self {
            close_downtime: from.is_downtime(),
            open_downtime: to.is_downtime(),
            requires_reason: to.is_downtime(),
        }
    }

    pub fn touches_downtime(&self) -> bool {
        self.close_downtime || self.open_downtime
    }
}

// ==========================================
// 请求与结果
// ==========================================

/// 状态切换请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangeRequest {
    pub machine_id: i64,
    pub status: MachineStatus,
    pub reason: Option<String>,
    pub description: Option<String>,
    pub category: Option<DowntimeCategory>,
    pub is_planned: bool,
}

impl StatusChangeRequest {
    pub fn new(machine_id: i64, status: MachineStatus) -> Self {
        Self {
            machine_id,
            status,
            reason: None,
            description: None,
            category: None,
            is_planned: false,
        }
    }

    pub fn with_reason(mut self, reason: &str, category: DowntimeCategory) -> Self {
        self.reason = Some(reason.to_string());
        self.category = Some(category);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn planned(mut self, is_planned: bool) -> Self {
        self.is_planned = is_planned;
        self
    }

    /// 目标为停机状态时提取停机字段
    fn downtime_fields(&self) -> EngineResult<Option<NewDowntime>> {
        if !self.status.is_downtime() {
            return Ok(None);
        }
        let reason = self
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                EngineError::validation(format!("切换到 {} 必须提供停机原因", self.status))
            })?;
        let category = self.category.ok_or_else(|| {
            EngineError::validation(format!("切换到 {} 必须提供停机分类", self.status))
        })?;

        Ok(Some(NewDowntime {
            reason: reason.to_string(),
            description: self.description.clone(),
            category,
            is_planned: self.is_planned,
        }))
    }
}

/// 一次状态切换的完整结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub machine_id: i64,
    pub previous_status: MachineStatus,
    pub new_status: MachineStatus,
    pub effects: TransitionEffects,
    pub closed_log: Option<StatusLogEntry>,
    pub opened_log: StatusLogEntry,
    pub closed_downtime: Option<DowntimeEntry>,
    pub opened_downtime: Option<DowntimeEntry>,
    pub line_status: LineStatus,
}

// ==========================================
// MachineStatusEngine - 设备状态机
// ==========================================
pub struct MachineStatusEngine {
    repos: OeeRepositories,
    clock: Arc<dyn Clock>,
    notifier: OptionalNotifier,
}

impl MachineStatusEngine {
    pub fn new(repos: OeeRepositories, clock: Arc<dyn Clock>) -> Self {
        Self {
            repos,
            clock,
            notifier: OptionalNotifier::none(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn OeeEventNotifier>) -> Self {
        self.notifier = OptionalNotifier::with_notifier(notifier);
        self
    }

    /// 新建产线
    pub fn create_line(&self, name: &str, code: &str) -> EngineResult<ProductionLine> {
        if name.trim().is_empty() || code.trim().is_empty() {
            return Err(EngineError::validation("产线名称与编码不能为空"));
        }
        let line = self.repos.line_repo.insert(name.trim(), code.trim(), self.clock.now())?;
        info!(line_id = line.line_id, code = %line.code, "产线已创建");
        Ok(line)
    }

    /// 注册设备
    ///
    /// 同一事务内: 插入设备 → 写入初始未结束状态条目 → 重算产线状态。
    /// 初始状态为停机类状态时不开启停机条目 (无原因可记)。
    #[instrument(skip(self, machine), fields(code = %machine.code))]
    pub fn register_machine(&self, machine: &NewMachine) -> EngineResult<Machine> {
        if machine.name.trim().is_empty() || machine.code.trim().is_empty() {
            return Err(EngineError::validation("设备名称与编码不能为空"));
        }
        if !(machine.ideal_cycle_time.is_finite() && machine.ideal_cycle_time > 0.0) {
            return Err(EngineError::validation(format!(
                "理想节拍必须为正数: {}",
                machine.ideal_cycle_time
            )));
        }

        let mut conn = self
            .repos
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = self.clock.now();

        if ProductionLineRepository::find_by_id_in(&tx, machine.production_line_id)?.is_none() {
            return Err(EngineError::not_found("ProductionLine", machine.production_line_id));
        }
        let created = MachineRepository::insert_in(&tx, machine, now)?;
        StatusLogRepository::append_status_change_in(&tx, created.machine_id, created.status, now)?;
        let line_status = ProductionLineRepository::recompute_status_in(&tx, created.production_line_id)?;

        tx.commit()?;

        info!(
            machine_id = created.machine_id,
            status = %created.status,
            line_status = %line_status,
            "设备已注册"
        );
        Ok(created)
    }

    /// 执行状态切换
    ///
    /// # 错误
    /// - `Validation`: 目标为 Maintenance/Breakdown 但缺少原因或分类 (无任何写入)
    /// - `NotFound`: 设备不存在
    /// - `InvalidTransition`: 需要开启停机时已有未结束停机 (整体回滚)
    #[instrument(skip(self, request), fields(machine_id = request.machine_id, to = %request.status))]
    pub fn change_status(&self, request: &StatusChangeRequest) -> EngineResult<TransitionOutcome> {
        let downtime = match request.downtime_fields() {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "状态切换被拒绝");
                return Err(e);
            }
        };

        let (outcome, machine, now) = {
            let mut conn = self
                .repos
                .conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            // 切换时间在持锁后读取, 提交顺序与时间顺序一致
            let now = self.clock.now();

            let machine = MachineRepository::find_by_id_in(&tx, request.machine_id)?
                .ok_or_else(|| EngineError::not_found("Machine", request.machine_id))?;

            // 台账为准, 缓存状态兜底
            let previous_status = StatusLogRepository::find_open_in(&tx, machine.machine_id)?
                .map(|entry| entry.status)
                .unwrap_or(machine.status);
            let effects = TransitionEffects::resolve(previous_status, request.status);

            let (closed_log, opened_log) =
                match StatusLogRepository::append_status_change_in(&tx, machine.machine_id, request.status, now) {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "关闭状态条目失败, 回滚切换");
                        return Err(e.into());
                    }
                };

            let closed_downtime = if effects.close_downtime {
                DowntimeRepository::close_in(&tx, machine.machine_id, now)?
            } else {
                None
            };

            let opened_downtime = match (&downtime, effects.open_downtime) {
                (Some(fields), true) => {
                    match DowntimeRepository::open_in(&tx, machine.machine_id, fields, now) {
                        Ok(entry) => Some(entry),
                        Err(e) => {
                            warn!(error = %e, from = %previous_status, "开启停机失败, 回滚切换");
                            return Err(e.into());
                        }
                    }
                }
                _ => None,
            };

            MachineRepository::update_cached_status_in(&tx, machine.machine_id, request.status)?;
            let line_status = ProductionLineRepository::recompute_status_in(&tx, machine.production_line_id)?;

            tx.commit()?;

            (
                TransitionOutcome {
                    machine_id: machine.machine_id,
                    previous_status,
                    new_status: request.status,
                    effects,
                    closed_log,
                    opened_log,
                    closed_downtime,
                    opened_downtime,
                    line_status,
                },
                machine,
                now,
            )
        };

        info!(
            from = %outcome.previous_status,
            to = %outcome.new_status,
            line_status = %outcome.line_status,
            downtime_opened = outcome.opened_downtime.is_some(),
            downtime_closed = outcome.closed_downtime.is_some(),
            "设备状态已切换"
        );

        self.notifier.notify(&MachineStatusChanged::new(
            machine.machine_id,
            &machine.name,
            machine.production_line_id,
            outcome.previous_status,
            outcome.new_status,
            now,
        ));

        Ok(outcome)
    }

    /// 停用设备 (软删除), 并重算产线状态
    pub fn deactivate_machine(&self, machine_id: i64) -> EngineResult<LineStatus> {
        let mut conn = self
            .repos
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let machine = MachineRepository::find_by_id_in(&tx, machine_id)?
            .ok_or_else(|| EngineError::not_found("Machine", machine_id))?;
        MachineRepository::set_active_in(&tx, machine_id, false)?;
        let line_status = ProductionLineRepository::recompute_status_in(&tx, machine.production_line_id)?;

        tx.commit()?;
        info!(machine_id, line_status = %line_status, "设备已停用");
        Ok(line_status)
    }

    /// 设备当前状态 (以台账未结束条目为准)
    pub fn current_status(&self, machine_id: i64) -> EngineResult<MachineStatus> {
        let machine = self.repos.machine_repo.get(machine_id)?;
        Ok(self
            .repos
            .status_log_repo
            .find_open(machine_id)?
            .map(|entry| entry.status)
            .unwrap_or(machine.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};
    use crate::engine::clock::ManualClock;
    use crate::engine::events::BroadcastNotifier;
    use chrono::{Duration, NaiveDateTime};
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn setup() -> (MachineStatusEngine, OeeRepositories, Arc<ManualClock>) {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        let repos = OeeRepositories::from_connection(Arc::new(Mutex::new(conn)));
        let clock = Arc::new(ManualClock::new(dt("2025-01-01 08:00:00")));
        let engine = MachineStatusEngine::new(repos.clone(), clock.clone());
        (engine, repos, clock)
    }

    #[test]
    fn test_transition_table() {
        use MachineStatus::*;
        let e = TransitionEffects::resolve(Running, Idle);
        assert!(!e.touches_downtime());
        assert!(!e.requires_reason);

        let e = TransitionEffects::resolve(Running, Breakdown);
        assert!(e.open_downtime && !e.close_downtime && e.requires_reason);

        let e = TransitionEffects::resolve(Maintenance, Idle);
        assert!(e.close_downtime && !e.open_downtime && !e.requires_reason);

        let e = TransitionEffects::resolve(Maintenance, Breakdown);
        assert!(e.close_downtime && e.open_downtime);
    }

    #[test]
    fn test_register_machine_writes_initial_entry() {
        let (engine, repos, _clock) = setup();
        let line = engine.create_line("Line A", "LA").unwrap();
        assert_eq!(line.status, LineStatus::Stopped);

        let machine = engine
            .register_machine(&NewMachine::new(line.line_id, "Press", "P-01", 60.0))
            .unwrap();
        assert_eq!(machine.status, MachineStatus::Idle);

        let log = repos.status_log_repo.list_by_machine(machine.machine_id).unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].is_open());
        assert_eq!(log[0].status, MachineStatus::Idle);

        let line = repos.line_repo.find_by_id(line.line_id).unwrap().unwrap();
        assert_eq!(line.status, LineStatus::Idle);
    }

    #[test]
    fn test_register_machine_rejects_unknown_line_without_writes() {
        let (engine, repos, _clock) = setup();
        let err = engine
            .register_machine(&NewMachine::new(42, "Press", "P-01", 60.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
        assert!(repos.machine_repo.list_all(None).unwrap().is_empty());
    }

    #[test]
    fn test_breakdown_then_repair_cycle() {
        let (engine, repos, clock) = setup();
        let line = engine.create_line("Line A", "LA").unwrap();
        let machine = engine
            .register_machine(&NewMachine::new(line.line_id, "Press", "P-01", 60.0).with_status(MachineStatus::Running))
            .unwrap();

        clock.advance(Duration::minutes(45));
        let outcome = engine
            .change_status(
                &StatusChangeRequest::new(machine.machine_id, MachineStatus::Breakdown)
                    .with_reason("motor failure", DowntimeCategory::Mechanical),
            )
            .unwrap();
        assert_eq!(outcome.previous_status, MachineStatus::Running);
        assert_eq!(outcome.closed_log.as_ref().unwrap().duration, Some(2700));
        assert!(outcome.opened_downtime.is_some());
        assert_eq!(outcome.line_status, LineStatus::Idle);

        clock.advance(Duration::minutes(20));
        let outcome = engine
            .change_status(&StatusChangeRequest::new(machine.machine_id, MachineStatus::Running))
            .unwrap();
        assert_eq!(outcome.closed_downtime.as_ref().unwrap().duration, Some(1200));
        assert_eq!(outcome.line_status, LineStatus::Running);
        assert!(repos.downtime_repo.find_open(machine.machine_id).unwrap().is_none());
        assert_eq!(engine.current_status(machine.machine_id).unwrap(), MachineStatus::Running);
    }

    #[test]
    fn test_maintenance_to_breakdown_hands_over_downtime() {
        let (engine, repos, clock) = setup();
        let line = engine.create_line("Line A", "LA").unwrap();
        let machine = engine
            .register_machine(&NewMachine::new(line.line_id, "Press", "P-01", 60.0))
            .unwrap();

        engine
            .change_status(
                &StatusChangeRequest::new(machine.machine_id, MachineStatus::Maintenance)
                    .with_reason("weekly PM", DowntimeCategory::Other)
                    .planned(true),
            )
            .unwrap();
        clock.advance(Duration::minutes(10));
        let outcome = engine
            .change_status(
                &StatusChangeRequest::new(machine.machine_id, MachineStatus::Breakdown)
                    .with_reason("bearing seized", DowntimeCategory::Mechanical),
            )
            .unwrap();

        let closed = outcome.closed_downtime.unwrap();
        assert!(closed.is_planned);
        assert_eq!(closed.duration, Some(600));
        let opened = outcome.opened_downtime.unwrap();
        assert!(!opened.is_planned);
        assert_eq!(opened.reason, "bearing seized");

        let all = repos.downtime_repo.list_by_machine(machine.machine_id).unwrap();
        assert_eq!(all.iter().filter(|d| d.is_open()).count(), 1);
    }

    #[test]
    fn test_missing_reason_leaves_ledgers_untouched() {
        let (engine, repos, _clock) = setup();
        let line = engine.create_line("Line A", "LA").unwrap();
        let machine = engine
            .register_machine(&NewMachine::new(line.line_id, "Press", "P-01", 60.0))
            .unwrap();

        let mut request = StatusChangeRequest::new(machine.machine_id, MachineStatus::Maintenance);
        request.reason = Some("   ".to_string());
        request.category = Some(DowntimeCategory::Other);
        let err = engine.change_status(&request).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = engine
            .change_status(&StatusChangeRequest::new(machine.machine_id, MachineStatus::Breakdown))
            .unwrap_err();
        assert!(err.is_client_error());

        assert_eq!(repos.status_log_repo.list_by_machine(machine.machine_id).unwrap().len(), 1);
        assert!(repos.downtime_repo.list_by_machine(machine.machine_id).unwrap().is_empty());
        assert_eq!(repos.machine_repo.get(machine.machine_id).unwrap().status, MachineStatus::Idle);
    }

    #[test]
    fn test_notifier_receives_event_after_commit() {
        let (engine, _repos, _clock) = setup();
        let notifier = Arc::new(BroadcastNotifier::new(4));
        let mut rx = notifier.subscribe();
        let engine = engine.with_notifier(notifier);

        let line = engine.create_line("Line A", "LA").unwrap();
        let machine = engine
            .register_machine(&NewMachine::new(line.line_id, "Press", "P-01", 60.0))
            .unwrap();
        engine
            .change_status(&StatusChangeRequest::new(machine.machine_id, MachineStatus::Running))
            .unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.machine_id, machine.machine_id);
        assert_eq!(event.previous_status, MachineStatus::Idle);
        assert_eq!(event.new_status, MachineStatus::Running);
        assert_eq!(event.machine_name, "Press");
    }

    #[test]
    fn test_clock_regression_rolls_back() {
        let (engine, repos, clock) = setup();
        let line = engine.create_line("Line A", "LA").unwrap();
        let machine = engine
            .register_machine(&NewMachine::new(line.line_id, "Press", "P-01", 60.0).with_status(MachineStatus::Running))
            .unwrap();

        clock.set(dt("2025-01-01 07:59:00"));
        let err = engine
            .change_status(
                &StatusChangeRequest::new(machine.machine_id, MachineStatus::Breakdown)
                    .with_reason("jam", DowntimeCategory::Mechanical),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        let log = repos.status_log_repo.list_by_machine(machine.machine_id).unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].is_open());
        assert!(repos.downtime_repo.list_by_machine(machine.machine_id).unwrap().is_empty());
        assert_eq!(repos.machine_repo.get(machine.machine_id).unwrap().status, MachineStatus::Running);
    }

    #[test]
    fn test_deactivate_recomputes_line() {
        let (engine, repos, _clock) = setup();
        let line = engine.create_line("Line A", "LA").unwrap();
        let machine = engine
            .register_machine(&NewMachine::new(line.line_id, "Press", "P-01", 60.0).with_status(MachineStatus::Running))
            .unwrap();

        let status = engine.deactivate_machine(machine.machine_id).unwrap();
        // 停用设备仍参与产线状态派生
        assert_eq!(status, LineStatus::Running);
        assert!(repos.machine_repo.list_active_by_line(line.line_id).unwrap().is_empty());

        assert!(matches!(
            engine.deactivate_machine(999).unwrap_err(),
            EngineError::NotFound { .. }
        ));
    }
}
