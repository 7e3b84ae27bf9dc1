/// 构建期注入的版本元数据
pub const BUILD_VERSION: &str = env!("EDCP_BUILD_VERSION");
pub const BUILD_COMMIT: &str = env!("EDCP_BUILD_COMMIT");
pub const BUILD_TIMESTAMP: &str = env!("EDCP_BUILD_TIMESTAMP");

/// 启动日志使用的版本摘要
pub fn summary() -> String {
    format!(
        "{} (build {}, commit {}, built at {})",
        env!("CARGO_PKG_VERSION"),
        BUILD_VERSION,
        BUILD_COMMIT,
        BUILD_TIMESTAMP
    )
}
