mod common;

use common::SharedBuffer;
use std::io;
use std::sync::atomic::Ordering;
use tracing_cloud_log::hook::{ServiceHook, ServiceIdentity};
use tracing_cloud_log::layer::CloudLogLayer;
use tracing_cloud_log::{Level, Logger, RpcContext, TextFormatter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

fn logger(buffer: &SharedBuffer) -> Logger {
    Logger::builder()
        .level(Level::Info)
        .report_caller(true)
        .hook(ServiceHook::new(ServiceIdentity::from_pod_name("golang-service-123-xyz")))
        .writer(buffer.clone())
        .build()
}

#[test]
fn events_are_written_as_json_lines() {
    let buffer = SharedBuffer::default();
    let subscriber = Registry::default().with(CloudLogLayer::new(logger(&buffer)));

    tracing::subscriber::with_default(subscriber, || {
        tracing::debug!("too quiet");
        tracing::info!(sse = "adebayo", attempt = 2, "I am a simple {}", "info");
        tracing::warn!(grpc.method = "/pkg.Service/Method", "slow call");
    });

    let lines = buffer.json_lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["message"], "I am a simple info");
    assert_eq!(lines[0]["severity"], "INFO");
    assert_eq!(lines[0]["sse"], "adebayo");
    assert_eq!(lines[0]["attempt"], 2);
    assert_eq!(lines[1]["severity"], "WARNING");
    assert_eq!(lines[1]["httpRequest"]["requestUrl"], "/pkg.Service/Method");
}

#[test]
fn error_events_get_service_context_and_location() {
    let buffer = SharedBuffer::default();
    let subscriber = Registry::default().with(CloudLogLayer::new(logger(&buffer)));
    let err = io::Error::new(io::ErrorKind::Other, "Helloerror");

    tracing::subscriber::with_default(subscriber, || {
        tracing::error!(error = &err as &(dyn std::error::Error + 'static), "I am a simple error");
    });

    let lines = buffer.json_lines();
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert_eq!(line["severity"], "ERROR");
    assert_eq!(line["message"], "I am a simple error");
    assert_eq!(line["error"], "Helloerror");
    assert_eq!(line["serviceContext"]["service"], "golang-service");
    assert_eq!(line["serviceContext"]["version"], "123");
    assert_eq!(line["context"]["reportLocation"]["filePath"], file!());
    assert_eq!(line["context"]["reportLocation"]["functionName"], module_path!());
    assert!(line.get("service").is_none());
}

#[test]
fn layer_counts_filtered_events() {
    let buffer = SharedBuffer::default();
    let layer = CloudLogLayer::new(logger(&buffer));
    let total = layer.total_events.clone();
    let filtered = layer.filtered_events.clone();
    let subscriber = Registry::default().with(layer);

    tracing::subscriber::with_default(subscriber, || {
        tracing::trace!("a");
        tracing::debug!("b");
        tracing::info!("c");
    });

    assert_eq!(total.load(Ordering::Relaxed), 3);
    assert_eq!(filtered.load(Ordering::Relaxed), 2);
    assert_eq!(buffer.json_lines().len(), 1);
}

#[test]
fn missing_metadata_is_reported_through_tracing() {
    let buffer = SharedBuffer::default();
    let log = logger(&buffer);
    let subscriber = Registry::default().with(CloudLogLayer::new(log.clone()));

    tracing::subscriber::with_default(subscriber, || {
        log.with_ctx(RpcContext::new()).info("no metadata here");
    });

    let lines = buffer.json_lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["severity"], "WARNING");
    assert_eq!(lines[0]["message"], "failed to retrieve metadata from rpc context");
    assert_eq!(lines[1]["message"], "no metadata here");
}

#[test]
fn text_output_for_development() {
    let buffer = SharedBuffer::default();
    let log = Logger::builder()
        .formatter(TextFormatter::new())
        .level(Level::Debug)
        .writer(buffer.clone())
        .build();
    let subscriber = Registry::default().with(CloudLogLayer::new(log));

    tracing::subscriber::with_default(subscriber, || {
        tracing::debug!(name = "ikem", "I am a simple debug");
    });

    let contents = buffer.contents();
    assert!(contents.starts_with("DEBU["), "{}", contents);
    assert!(contents.ends_with("] I am a simple debug name=ikem\n"), "{}", contents);
}
