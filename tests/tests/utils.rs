use dbperf::core::{BenchConfig, ConnectionConfig, WorkloadConfig};
use std::sync::{Arc, OnceLock};
use tracing::error;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter("dbperf=debug,mock_store=debug")
            .with_test_writer()
            .try_init();
    });
}

/// A config against a fake host with every test switched off.
#[allow(unused)]
pub fn quiet_config() -> BenchConfig {
    let mut config = BenchConfig::new(ConnectionConfig::new("mock.local", "bench", "secret"));
    config.label = "Mock".to_string();
    config.workload = WorkloadConfig::none();
    config
}

#[allow(unused)]
pub fn shared(config: BenchConfig) -> Arc<BenchConfig> {
    Arc::new(config)
}
