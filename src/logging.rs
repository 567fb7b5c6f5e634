// ==========================================
// 日志系统初始化
// ==========================================
// 使用 tracing 和 tracing-subscriber
// 日志级别由 RUST_LOG 控制; EQUIPMENT_OEE_LOG_FORMAT=json 切换为 JSON 输出
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// 日志格式环境变量
pub const LOG_FORMAT_ENV: &str = "EQUIPMENT_OEE_LOG_FORMAT";

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn json_requested() -> bool {
    std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// 初始化日志系统
///
/// # 环境变量
/// - RUST_LOG: 日志级别过滤器（默认: info）
///   例如: RUST_LOG=debug 或 RUST_LOG=equipment_oee=trace,perf=info
/// - EQUIPMENT_OEE_LOG_FORMAT: `json` 输出结构化 JSON 行, 其他值为文本
///
/// 重复调用时保留首次安装的订阅者
///
/// # 示例
/// ```no_run
/// use equipment_oee::logging;
/// logging::init();
/// ```
pub fn init() {
    let builder = fmt()
        .with_env_filter(default_filter())
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    let _ = if json_requested() {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.try_init()
    };
}

/// 初始化测试环境的日志系统
///
/// 使用更详细的日志级别，便于调试
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
