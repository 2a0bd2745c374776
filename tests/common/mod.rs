#![allow(dead_code)]

use relaylog::{DeliveryConfig, EnvironmentContext, MemoryFatalHandler, Pipeline};

/// Route `tracing` output through the test harness so failures show it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn config() -> DeliveryConfig {
    DeliveryConfig::builder("https://collector.test/logs")
        .performance_logging(true)
        .masked_keywords(["password", "token"])
        .build()
        .unwrap()
}

/// Pipeline with empty enrichment and an in-memory fatal channel.
pub fn pipeline(config: Option<DeliveryConfig>) -> (Pipeline, MemoryFatalHandler) {
    init_tracing();
    let fatal = MemoryFatalHandler::new();
    let mut builder =
        Pipeline::builder().context(EnvironmentContext::new()).fatal_handler(fatal.clone());
    if let Some(config) = config {
        builder = builder.config(config);
    }
    (builder.build().unwrap(), fatal)
}
