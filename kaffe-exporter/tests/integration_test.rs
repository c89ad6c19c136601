//! Integration tests for the metrics exporter.
//!
//! These tests verify the flow from observer-owned descriptors to the
//! HTTP metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kaffe_exporter::mapping::build_metric_name;
use kaffe_exporter::{HttpServer, MetricDescriptor, MetricRegistry, RegistryError};
use tokio::sync::watch;

/// Helper to extract the value of a metric line from the text output.
fn metric_value(output: &str, name: &str) -> Option<f64> {
    output
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(metric), Some(value)) if metric == name => value.parse().ok(),
                _ => None,
            }
        })
}

#[test]
fn test_values_written_after_registration_are_rendered() {
    let level = MetricDescriptor::gauge(
        build_metric_name("kaffe", "water_container_liters"),
        "Water left in the container",
    );
    let power = MetricDescriptor::gauge(build_metric_name("kaffe", "power_on"), "Brewer power");

    let mut registry = MetricRegistry::new();
    registry.register(&level).unwrap();
    registry.register(&power).unwrap();
    let registry = Arc::new(registry);

    level.set(0.75);
    power.set(1.0);

    let output = registry.render();
    assert_eq!(metric_value(&output, "kaffe_water_container_liters"), Some(0.75));
    assert_eq!(metric_value(&output, "kaffe_power_on"), Some(1.0));
}

#[test]
fn test_duplicate_after_sanitizing_is_rejected() {
    let mut registry = MetricRegistry::new();
    registry
        .register(&MetricDescriptor::gauge(
            build_metric_name("kaffe", "plate-temp"),
            "first",
        ))
        .unwrap();

    let result = registry.register(&MetricDescriptor::gauge(
        build_metric_name("kaffe", "plate.temp"),
        "second",
    ));

    assert_eq!(
        result,
        Err(RegistryError::Duplicate("kaffe_plate_temp".to_string()))
    );
}

#[tokio::test]
async fn test_concurrent_writes_and_renders() {
    let descriptor = MetricDescriptor::gauge("kaffe_water_flow_liters_total", "Flow");
    let mut registry = MetricRegistry::new();
    registry.register(&descriptor).unwrap();
    let registry = Arc::new(registry);

    let writer = {
        let descriptor = descriptor.clone();
        tokio::spawn(async move {
            for i in 0..1000 {
                descriptor.set(i as f64);
                tokio::task::yield_now().await;
            }
        })
    };

    let reader = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for _ in 0..1000 {
                let output = registry.render();
                assert!(metric_value(&output, "kaffe_water_flow_liters_total").is_some());
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();

    assert_eq!(descriptor.value(), 999.0);
}

#[tokio::test]
async fn test_http_server_serves_metrics() {
    let descriptor = MetricDescriptor::gauge("kaffe_plate_temperature_celsius", "Plate");
    descriptor.set(81.5);

    let mut registry = MetricRegistry::new();
    registry.register(&descriptor).unwrap();
    let registry = Arc::new(registry);

    // Bind to find a free port, then hand it to the server.
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let actual_addr = listener.local_addr().unwrap();
    drop(listener);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = HttpServer::new(registry, actual_addr, "/metrics".to_string());
    let server_handle = tokio::spawn(async move {
        let _ = server.run(shutdown_rx).await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/metrics", actual_addr))
        .send()
        .await;

    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(1), server_handle).await;

    match response {
        Ok(resp) => {
            assert!(resp.status().is_success());
            let body = resp.text().await.unwrap();
            assert_eq!(
                metric_value(&body, "kaffe_plate_temperature_celsius"),
                Some(81.5)
            );
        }
        Err(e) => {
            // Server might not have started in time on a loaded machine.
            eprintln!("HTTP request failed: {}", e);
        }
    }
}
