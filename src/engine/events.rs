// ==========================================
// 设备综合效率系统 - 状态变更通知
// ==========================================
// 职责: 定义状态变更 / 产出登记通知 trait, 由看板 / 推送层实现
// 约束: 通知在事务提交后发出; 投递失败只记录日志, 不回滚台账
// ==========================================

use crate::domain::ledger::ProductionOutput;
use crate::domain::types::MachineStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// 设备状态变更事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineStatusChanged {
    pub event_id: String,
    pub machine_id: i64,
    pub machine_name: String,
    pub production_line_id: i64,
    pub previous_status: MachineStatus,
    pub new_status: MachineStatus,
    pub timestamp: NaiveDateTime,
}

impl MachineStatusChanged {
    pub fn new(
        machine_id: i64,
        machine_name: &str,
        production_line_id: i64,
        previous_status: MachineStatus,
        new_status: MachineStatus,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            machine_id,
            machine_name: machine_name.to_string(),
            production_line_id,
            previous_status,
            new_status,
            timestamp,
        }
    }
}

/// 产出登记事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionOutputRecorded {
    pub event_id: String,
    pub output_id: i64,
    pub machine_id: i64,
    pub machine_name: String,
    pub production_line_id: i64,
    pub production_schedule_id: Option<i64>,
    pub quantity_produced: i64,
    pub quantity_rejected: i64,
    /// 合格率 (%)
    pub quality_rate: f64,
    pub cycle_time: Option<f64>,
    pub recorded_at: NaiveDateTime,
}

impl ProductionOutputRecorded {
    pub fn new(output: &ProductionOutput, machine_name: &str, production_line_id: i64) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            output_id: output.output_id,
            machine_id: output.machine_id,
            machine_name: machine_name.to_string(),
            production_line_id,
            production_schedule_id: output.production_schedule_id,
            quantity_produced: output.quantity_produced,
            quantity_rejected: output.quantity_rejected,
            quality_rate: crate::domain::metrics::to_percent(output.quality_rate()),
            cycle_time: output.cycle_time,
            recorded_at: output.recorded_at,
        }
    }
}

/// 事件通知者 Trait
///
/// # 返回
/// - `Ok(())`: 已投递 (或无订阅者)
/// - `Err`: 投递失败, 调用方只记录不传播
pub trait OeeEventNotifier: Send + Sync {
    fn notify(&self, event: &MachineStatusChanged) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// 产出登记通知; 默认不处理
    fn notify_output(&self, _event: &ProductionOutputRecorded) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

/// 空操作通知者
#[derive(Debug, Clone, Default)]
pub struct NoOpNotifier;

impl OeeEventNotifier for NoOpNotifier {
    fn notify(&self, event: &MachineStatusChanged) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            machine_id = event.machine_id,
            new_status = %event.new_status,
            "NoOpNotifier: 跳过状态变更通知"
        );
        Ok(())
    }
}

/// 基于 tokio broadcast 的通知者, 供看板订阅
pub struct BroadcastNotifier {
    sender: broadcast::Sender<MachineStatusChanged>,
    output_sender: broadcast::Sender<ProductionOutputRecorded>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let (output_sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, output_sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MachineStatusChanged> {
        self.sender.subscribe()
    }

    pub fn subscribe_outputs(&self) -> broadcast::Receiver<ProductionOutputRecorded> {
        self.output_sender.subscribe()
    }
}

impl OeeEventNotifier for BroadcastNotifier {
    fn notify(&self, event: &MachineStatusChanged) -> Result<(), Box<dyn Error + Send + Sync>> {
        // 无订阅者时 send 返回 Err, 不视为失败
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(event.clone())
            .map(|_| ())
            .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)
    }

    fn notify_output(&self, event: &ProductionOutputRecorded) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.output_sender.receiver_count() == 0 {
            return Ok(());
        }
        self.output_sender
            .send(event.clone())
            .map(|_| ())
            .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)
    }
}

/// 可选的通知者包装
pub struct OptionalNotifier {
    inner: Option<Arc<dyn OeeEventNotifier>>,
}

impl OptionalNotifier {
    pub fn with_notifier(notifier: Arc<dyn OeeEventNotifier>) -> Self {
        Self {
            inner: Some(notifier),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发送通知; 失败只记录 warn
    pub fn notify(&self, event: &MachineStatusChanged) {
        let Some(notifier) = &self.inner else {
            tracing::debug!(event_id = %event.event_id, "OptionalNotifier: 未配置通知者, 跳过事件");
            return;
        };
        if let Err(e) = notifier.notify(event) {
            tracing::warn!(
                event_id = %event.event_id,
                machine_id = event.machine_id,
                error = %e,
                "状态变更通知投递失败"
            );
        }
    }

    /// 发送产出登记通知; 失败只记录 warn
    pub fn notify_output(&self, event: &ProductionOutputRecorded) {
        let Some(notifier) = &self.inner else {
            tracing::debug!(event_id = %event.event_id, "OptionalNotifier: 未配置通知者, 跳过事件");
            return;
        };
        if let Err(e) = notifier.notify_output(event) {
            tracing::warn!(
                event_id = %event.event_id,
                output_id = event.output_id,
                error = %e,
                "产出登记通知投递失败"
            );
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalNotifier {
    fn default() -> Self {
        Self::none()
    }
}
