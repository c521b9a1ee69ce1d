//! 日志初始化
//!
//! 基于 tracing-subscriber 的 fmt 输出，整个进程只安装一次

use crate::options::LoggingOptions;
use tracing::Level;

/// 解析日志级别，无法识别时回退到 info
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// 安装全局日志订阅者
///
/// 返回是否由本次调用完成安装；日志被禁用或已安装过时返回 false
pub fn init(options: &LoggingOptions) -> bool {
    if !options.enabled {
        return false;
    }

    tracing_subscriber::fmt()
        .with_max_level(parse_level(&options.level))
        .with_target(false)
        .try_init()
        .is_ok()
}
