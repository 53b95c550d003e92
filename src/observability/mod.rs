//! 可观测性：tracing 订阅器初始化
//!
//! 默认 info，RUST_LOG 可覆盖；verbose 时默认 debug。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // 测试或嵌入场景下可能已有全局订阅器
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
