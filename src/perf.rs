// ==========================================
// 设备综合效率系统 - 性能统计
// ==========================================
// 职责: 统计指标计算的耗时 / SQL 语句数 / 慢 SQL 数, 输出到 target "perf"
// ==========================================

use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// SQL 统计开关
pub const PERF_SQL_ENV: &str = "EQUIPMENT_OEE_PERF_SQL";
/// 慢 SQL 阈值（毫秒）
pub const SLOW_SQL_MS_ENV: &str = "EQUIPMENT_OEE_SLOW_SQL_MS";

static PERF_SQL_ENABLED: AtomicBool = AtomicBool::new(false);
static SLOW_SQL_THRESHOLD_MS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static PERF_DEPTH: Cell<u32> = Cell::new(0);
    static SQL_COUNT: Cell<u64> = Cell::new(0);
    static SLOW_SQL_COUNT: Cell<u64> = Cell::new(0);
}

fn is_true(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on")
}

fn truncate_sql(sql: &str, max_len: usize) -> String {
    let s = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.chars().count() <= max_len {
        return s;
    }
    let cut: String = s.chars().take(max_len).collect();
    format!("{}…", cut)
}

/// SQL 统计参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlTracingSettings {
    pub enabled: bool,
    /// 慢 SQL 阈值（毫秒）, 0 表示不记录
    pub slow_sql_ms: u64,
}

impl SqlTracingSettings {
    /// 从环境变量读取
    ///
    /// - Debug 默认开启；Release 默认关闭
    /// - `EQUIPMENT_OEE_PERF_SQL=1` 强制开启, `=0` 强制关闭
    /// - `EQUIPMENT_OEE_SLOW_SQL_MS=50` 配置慢 SQL 阈值
    pub fn from_env() -> Self {
        let enabled = match std::env::var(PERF_SQL_ENV) {
            Ok(v) => is_true(&v),
            Err(_) => cfg!(debug_assertions),
        };
        let slow_sql_ms = std::env::var(SLOW_SQL_MS_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(if cfg!(debug_assertions) { 50 } else { 200 });
        Self { enabled, slow_sql_ms }
    }
}

/// 安装 SQLite 语句 trace/profile（用于 SQL 计数 + 慢查询日志）, 参数取自环境变量
pub fn install_sqlite_tracing(conn: &mut Connection) {
    install_sqlite_tracing_with(conn, SqlTracingSettings::from_env());
}

pub fn install_sqlite_tracing_with(conn: &mut Connection, settings: SqlTracingSettings) {
    PERF_SQL_ENABLED.store(settings.enabled, Ordering::Relaxed);

    if !settings.enabled {
        conn.trace(None);
        conn.profile(None);
        return;
    }

    SLOW_SQL_THRESHOLD_MS.store(settings.slow_sql_ms, Ordering::Relaxed);

    conn.trace(Some(sql_trace_callback));
    conn.profile(Some(sql_profile_callback));
}

fn sql_trace_callback(_sql: &str) {
    if !PERF_SQL_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    if PERF_DEPTH.with(|d| d.get() > 0) {
        SQL_COUNT.with(|c| c.set(c.get().saturating_add(1)));
    }
}

fn sql_profile_callback(sql: &str, duration: Duration) {
    if !PERF_SQL_ENABLED.load(Ordering::Relaxed) {
        return;
    }

    let ms = duration.as_millis() as u64;
    let threshold = SLOW_SQL_THRESHOLD_MS.load(Ordering::Relaxed);
    if threshold > 0 && ms >= threshold {
        tracing::warn!(
            target: "slow_sql",
            duration_ms = ms,
            sql = %truncate_sql(sql, 420),
            "slow sql"
        );
        if PERF_DEPTH.with(|d| d.get() > 0) {
            SLOW_SQL_COUNT.with(|c| c.set(c.get().saturating_add(1)));
        }
    }
}

/// 性能统计 Guard：drop 时记录 elapsed_ms + SQL 语句数 + 慢 SQL 数
///
/// ```ignore
/// let _perf = equipment_oee::perf::PerfGuard::new("line_oee");
/// ```
pub struct PerfGuard {
    op: &'static str,
    start: Instant,
    sql_start: u64,
    slow_sql_start: u64,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        PERF_DEPTH.with(|d| d.set(d.get().saturating_add(1)));
        Self {
            op,
            start: Instant::now(),
            sql_start: SQL_COUNT.with(|c| c.get()),
            slow_sql_start: SLOW_SQL_COUNT.with(|c| c.get()),
        }
    }

    /// 当前已执行的 SQL 语句数 (本 guard 范围内)
    pub fn sql_count(&self) -> u64 {
        SQL_COUNT.with(|c| c.get()).saturating_sub(self.sql_start)
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        let sql_count = self.sql_count();
        let slow_sql_count = SLOW_SQL_COUNT
            .with(|c| c.get())
            .saturating_sub(self.slow_sql_start);

        tracing::info!(
            target: "perf",
            op = self.op,
            elapsed_ms,
            sql_count,
            slow_sql_count,
            "done"
        );

        PERF_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_sql_collapses_whitespace() {
        assert_eq!(truncate_sql("SELECT  1\n  FROM t", 100), "SELECT 1 FROM t");
        assert_eq!(truncate_sql("SELECT 12345", 6), "SELECT…");
    }

    #[test]
    fn test_guard_counts_statements_when_enabled() {
        let mut conn = Connection::open_in_memory().unwrap();
        install_sqlite_tracing_with(
            &mut conn,
            SqlTracingSettings {
                enabled: true,
                slow_sql_ms: 50,
            },
        );

        let guard = PerfGuard::new("test_op");
        conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
            .unwrap();
        let _: i64 = conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap();
        assert!(guard.sql_count() >= 1);
    }
}
