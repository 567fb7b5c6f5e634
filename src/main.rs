// ==========================================
// 设备综合效率系统 - 报表命令行
// ==========================================
// 用法:
//   oee-report [db_path] [period] [line_id]
//
// - db_path 缺省时使用 get_default_db_path()
// - period: hour | day | week | month | quarter | year (缺省 week)
//   计划生产时间按整日计, 不足一整日的窗口 (hour / day / 周一的 week)
//   可用率与 OEE 为 0
// - line_id 缺省时输出全部活跃产线
// 输出: JSON (产线 OEE + 停机帕累托 + 设备可靠性 + 排产计划达成)
// ==========================================

use anyhow::{anyhow, Context};
use equipment_oee::config::ConfigManager;
use equipment_oee::db::{get_default_db_path, init_schema, open_sqlite_connection};
use equipment_oee::domain::{
    DelayedSchedule, LineOeeResult, ParetoReport, PlannedVsActual, PlantOeeResult, ReliabilityMetrics,
};
use equipment_oee::engine::{
    Clock, OeeCalculator, OeeRepositories, ProductionScheduleEngine, ReliabilityAnalyzer, SystemClock,
};
use equipment_oee::{logging, perf, Period};
use serde::Serialize;
use std::sync::{Arc, Mutex};

const DEFAULT_PERIOD: Period = Period::Week;

#[derive(Serialize)]
struct LineReport {
    line_id: i64,
    name: String,
    oee: LineOeeResult,
    pareto: ParetoReport,
    reliability: Vec<ReliabilityMetrics>,
    schedules: PlannedVsActual,
    delayed_schedules: Vec<DelayedSchedule>,
}

#[derive(Serialize)]
struct Report {
    app: &'static str,
    version: &'static str,
    period: Period,
    plant: PlantOeeResult,
    lines: Vec<LineReport>,
}

fn main() -> anyhow::Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let db_path = args
        .next()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(get_default_db_path);
    let period: Period = match args.next() {
        Some(raw) => raw.parse().map_err(|e: String| anyhow!(e))?,
        None => DEFAULT_PERIOD,
    };
    let line_filter: Option<i64> = args
        .next()
        .map(|raw| raw.trim().parse::<i64>().with_context(|| format!("无效的产线 ID: {}", raw)))
        .transpose()?;

    tracing::info!(db_path = %db_path, period = %period, ?line_filter, "生成 OEE 报表");

    let mut conn = open_sqlite_connection(&db_path).with_context(|| format!("无法打开数据库: {}", db_path))?;
    init_schema(&conn)?;
    perf::install_sqlite_tracing(&mut conn);
    let conn = Arc::new(Mutex::new(conn));

    let config = ConfigManager::from_connection(conn.clone()).load_production_config()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let repos = OeeRepositories::from_connection(conn);
    let calculator = OeeCalculator::new(repos.clone(), config.clone(), clock.clone());
    let analyzer = ReliabilityAnalyzer::new(repos.clone(), config, clock.clone());
    let schedules = ProductionScheduleEngine::new(repos.clone(), clock.clone());

    let now = clock.now();
    let (start, end) = period.resolve(now);
    if period.whole_days(now) == 0 {
        tracing::warn!(period = %period, %start, %end, "统计窗口不足一整日, 计划生产时间为 0");
    }
    let lines = match line_filter {
        Some(id) => vec![repos
            .line_repo
            .find_by_id(id)?
            .ok_or_else(|| anyhow!("产线不存在: {}", id))?],
        None => repos.line_repo.list_active()?,
    };

    let mut line_reports = Vec::with_capacity(lines.len());
    for line in lines {
        let oee = calculator.line_oee(line.line_id, start, end)?;
        let pareto = analyzer.pareto(Some(line.line_id), period)?;
        let reliability = repos
            .machine_repo
            .list_active_by_line(line.line_id)?
            .iter()
            .map(|m| analyzer.reliability(m.machine_id, start, end))
            .collect::<Result<Vec<_>, _>>()?;
        line_reports.push(LineReport {
            line_id: line.line_id,
            name: line.name,
            oee,
            pareto,
            reliability,
            schedules: schedules.planned_vs_actual(Some(line.line_id), period)?,
            delayed_schedules: schedules.delayed_schedules(Some(line.line_id))?,
        });
    }

    let report = Report {
        app: equipment_oee::APP_NAME,
        version: equipment_oee::VERSION,
        period,
        plant: calculator.plant_oee(start, end)?,
        lines: line_reports,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
