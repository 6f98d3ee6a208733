use std::io;
use std::time::Instant;

use tracing_cloud_log::init::{try_init_with_writer, LoggerConfig};
use tracing_cloud_log::{FieldValue, RpcContext};

fn main() {
    let config = LoggerConfig::for_environment("production");
    let logger = match try_init_with_writer(&config, io::sink()) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        let ctx = RpcContext::incoming([
            ("author_id", format!("user-{}", i % 100)),
            ("author_name", "load tester".to_string()),
            ("correlation_id", format!("corr-{}", i)),
        ])
        .with_tag("grpc.request.shard", i % 8);

        logger
            .with_ctx(ctx)
            .with_field("iteration", i)
            .with_field("error", FieldValue::error(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")))
            .error("custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: formatted {} entries in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
