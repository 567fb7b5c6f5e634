// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、引擎装配、测试数据生成等功能
// ==========================================

#![allow(dead_code)]

use chrono::{Duration, NaiveDateTime};
use equipment_oee::config::ProductionConfig;
use equipment_oee::db::{init_schema, open_sqlite_connection};
use equipment_oee::domain::{DowntimeCategory, Machine, MachineStatus, NewMachine, NewProductionOutput};
use equipment_oee::engine::{
    Clock, ManualClock, MachineStatusEngine, OeeCalculator, OeeRepositories, ProductionMetricsEngine,
    ProductionScheduleEngine, ReliabilityAnalyzer, StatusChangeRequest, StatusOverviewService,
};
use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 解析测试时间戳
pub fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 测试环境: 共享连接上的全部引擎 + 手动时钟
pub struct TestEnv {
    pub _temp_file: NamedTempFile,
    pub db_path: String,
    pub repos: OeeRepositories,
    pub clock: Arc<ManualClock>,
    pub status_engine: Arc<MachineStatusEngine>,
    pub oee: OeeCalculator,
    pub reliability: ReliabilityAnalyzer,
    pub overview: StatusOverviewService,
    pub production: ProductionMetricsEngine,
    pub schedules: ProductionScheduleEngine,
}

/// 以默认生产参数创建测试环境
pub fn setup_env(start: &str) -> TestEnv {
    setup_env_with_config(start, ProductionConfig::default())
}

pub fn setup_env_with_config(start: &str, config: ProductionConfig) -> TestEnv {
    let (temp_file, db_path) = create_test_db().unwrap();
    let conn: Arc<Mutex<Connection>> = Arc::new(Mutex::new(open_sqlite_connection(&db_path).unwrap()));
    let repos = OeeRepositories::from_connection(conn);
    let clock = Arc::new(ManualClock::new(dt(start)));

    TestEnv {
        _temp_file: temp_file,
        db_path,
        status_engine: Arc::new(MachineStatusEngine::new(repos.clone(), clock.clone())),
        oee: OeeCalculator::new(repos.clone(), config.clone(), clock.clone()),
        reliability: ReliabilityAnalyzer::new(repos.clone(), config.clone(), clock.clone()),
        overview: StatusOverviewService::new(repos.clone(), clock.clone()),
        production: ProductionMetricsEngine::new(repos.clone(), config, clock.clone()),
        schedules: ProductionScheduleEngine::new(repos.clone(), clock.clone()),
        repos,
        clock,
    }
}

impl TestEnv {
    /// 新建产线并注册一台设备 (初始 Idle)
    pub fn line_with_machine(&self, line_code: &str, machine_code: &str, ideal_cycle_time: f64) -> (i64, Machine) {
        let line = self
            .status_engine
            .create_line(&format!("Line {}", line_code), line_code)
            .unwrap();
        let machine = self
            .status_engine
            .register_machine(&NewMachine::new(
                line.line_id,
                &format!("Machine {}", machine_code),
                machine_code,
                ideal_cycle_time,
            ))
            .unwrap();
        (line.line_id, machine)
    }

    pub fn clock_now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// 时钟前进若干秒
    pub fn advance(&self, seconds: i64) {
        self.clock.advance(Duration::seconds(seconds));
    }

    pub fn run(&self, machine_id: i64) {
        self.status_engine
            .change_status(&StatusChangeRequest::new(machine_id, MachineStatus::Running))
            .unwrap();
    }

    pub fn idle(&self, machine_id: i64) {
        self.status_engine
            .change_status(&StatusChangeRequest::new(machine_id, MachineStatus::Idle))
            .unwrap();
    }

    /// 切换到故障 (非计划停机)
    pub fn break_down(&self, machine_id: i64, reason: &str, category: DowntimeCategory) {
        self.status_engine
            .change_status(
                &StatusChangeRequest::new(machine_id, MachineStatus::Breakdown).with_reason(reason, category),
            )
            .unwrap();
    }

    /// 登记一笔产出
    pub fn record(&self, machine_id: i64, produced: i64, rejected: i64, at: &str) {
        self.production
            .record_output(&NewProductionOutput {
                machine_id,
                production_schedule_id: None,
                quantity_produced: produced,
                quantity_rejected: rejected,
                cycle_time: Some(60.0),
                recorded_at: dt(at),
            })
            .unwrap();
    }
}
