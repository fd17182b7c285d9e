//! 日志初始化
//!
//! 库内部只使用 `log` 宏，由二进制入口决定输出方式。

/// 初始化 env_logger，`RUST_LOG` 优先于 `default_level`
///
/// 重复调用是安全的 (测试中常见)，只有第一次生效。
pub fn init_logger(default_level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .try_init();
}
