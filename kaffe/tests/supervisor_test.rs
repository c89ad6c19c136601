//! End-to-end supervision tests with scripted observers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use kaffe::error::ObserverError;
use kaffe::{Observer, ShutdownCause, Supervisor, TaskKind};
use kaffe_exporter::{MetricDescriptor, MetricRegistry};

struct ScriptedObserver {
    name: &'static str,
    descriptor: MetricDescriptor,
    failing: bool,
    observed: AtomicUsize,
    stops: Arc<AtomicUsize>,
}

impl ScriptedObserver {
    fn new(name: &'static str, failing: bool) -> Self {
        Self {
            name,
            descriptor: MetricDescriptor::gauge(format!("kaffe_{}", name), name),
            failing,
            observed: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Observer for ScriptedObserver {
    fn name(&self) -> &str {
        self.name
    }

    fn descriptor(&self) -> MetricDescriptor {
        self.descriptor.clone()
    }

    async fn observe(&self) -> Result<(), ObserverError> {
        self.observed.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(ObserverError::InvalidReading("sensor disconnected".into()));
        }
        self.descriptor.set(1.0);
        Ok(())
    }

    fn stop(&self) -> Result<(), ObserverError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_failing_observer_drains_everything() {
    let healthy = ScriptedObserver::new("plate_temperature_celsius", false);
    let failing = ScriptedObserver::new("water_container_liters", true);
    let stops = [healthy.stops.clone(), failing.stops.clone()];

    let mut registry = MetricRegistry::new();
    let supervisor =
        Supervisor::new(vec![healthy, failing], &mut registry, Duration::from_secs(10)).unwrap();
    assert_eq!(registry.len(), 2);

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        supervisor.run_until(std::future::pending::<()>()),
    )
    .await
    .expect("drain did not finish");

    match &report.cause {
        ShutdownCause::Failure(failure) => {
            assert_eq!(failure.name, "water_container_liters");
            assert_eq!(failure.task, TaskKind::Poller);
            assert!(failure.to_string().contains("sensor disconnected"));
        }
        ShutdownCause::Signal => panic!("expected a failure-initiated drain"),
    }

    assert_eq!(
        report.stopped,
        vec!["plate_temperature_celsius", "water_container_liters"]
    );
    assert!(report.stop_failures.is_empty());
    for stop in &stops {
        assert_eq!(stop.load(Ordering::SeqCst), 1);
    }

    let err = report.into_result().unwrap_err();
    assert!(err.to_string().contains("water_container_liters"));
}

#[tokio::test]
async fn test_signal_drain_is_clean() {
    let observers = vec![
        ScriptedObserver::new("power_on", false),
        ScriptedObserver::new("plate_mode", false),
    ];
    let descriptors: Vec<_> = observers.iter().map(|o| o.descriptor()).collect();

    let mut registry = MetricRegistry::new();
    let supervisor = Supervisor::new(observers, &mut registry, Duration::from_secs(10)).unwrap();

    let report = supervisor
        .run_until(tokio::time::sleep(Duration::from_millis(100)))
        .await;

    assert!(matches!(report.cause, ShutdownCause::Signal));
    assert_eq!(report.stopped.len(), 2);
    for descriptor in descriptors {
        assert_eq!(descriptor.value(), 1.0);
    }
    assert!(report.into_result().is_ok());
}
