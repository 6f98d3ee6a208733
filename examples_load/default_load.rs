use std::io;
use std::time::Instant;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use tracing_cloud_log::hook::{ServiceHook, ServiceIdentity};
use tracing_cloud_log::layer::CloudLogLayer;
use tracing_cloud_log::Logger;

fn main() {
    let logger = Logger::builder()
        .report_caller(true)
        .hook(ServiceHook::new(ServiceIdentity::from_pod_name("load-test-6b7c8d-abcde")))
        .writer(io::sink())
        .build();
    let subscriber = Registry::default().with(CloudLogLayer::new(logger));
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("{}", e);
        return;
    }

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, grpc.method = "/load.Test/Run", "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: formatted {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
