use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow;
use prometheus::{
    Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

pub mod operations {
    pub mod legacy {
        pub const ALLOCATION_AT: &str = "allocation_at";
        pub const SET_ALLOCATION: &str = "set_allocation";
    }
    pub mod current {
        pub const POOL_COUNT: &str = "pool_count";
        pub const POOL_AT: &str = "pool_at";
        pub const CREATE_POOL: &str = "create_pool";
        pub const SET_POOL: &str = "set_pool";
    }
}

pub mod outcome {
    pub const SUCCESS: f64 = 1.0;
    pub const FAILURE: f64 = 0.0;
    pub const DRY_RUN: f64 = 2.0;
}

pub trait Registar {
    fn register_on(&self, registry: &Registry) -> anyhow::Result<()>;
}

pub struct Metrics {
    pub metadata: Metadata,
    pub services: Services,
    pub execution: Execution,
}

impl Registar for Metrics {
    fn register_on(&self, registry: &Registry) -> anyhow::Result<()> {
        self.metadata.register_on(registry)?;
        self.services.register_on(registry)?;
        self.execution.register_on(registry)?;
        Ok(())
    }
}

pub struct Metadata {
    pub network_chain: GaugeVec,
    pub run_counter: IntCounterVec,
}

impl Registar for Metadata {
    fn register_on(&self, registry: &Registry) -> anyhow::Result<()> {
        registry.register(Box::new(self.network_chain.clone()))?;
        registry.register(Box::new(self.run_counter.clone()))?;
        Ok(())
    }
}

pub struct Service {
    pub call_count: IntCounterVec,
    pub failure_count: IntCounterVec,
    pub execution_time_seconds: HistogramVec,
}

impl Registar for Service {
    fn register_on(&self, registry: &Registry) -> anyhow::Result<()> {
        registry.register(Box::new(self.call_count.clone()))?;
        registry.register(Box::new(self.failure_count.clone()))?;
        registry.register(Box::new(self.execution_time_seconds.clone()))?;
        Ok(())
    }
}

impl Service {
    pub async fn run_with_metrics_and_logs_async<T, E, F, Fut>(&self, operation: &str, f: F) -> Result<T, E>
    where
        E: std::fmt::Debug,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_count.with_label_values(&[operation]).inc();
        let timer = self
            .execution_time_seconds
            .with_label_values(&[operation])
            .start_timer();
        let result = f().await;
        timer.observe_duration();
        if let Err(ref err) = result {
            self.failure_count.with_label_values(&[operation]).inc();
            tracing::debug!(operation, "Call failed: {err:?}");
        }
        result
    }
}

pub struct Services {
    pub legacy_registry: Arc<Service>,
    pub current_registry: Arc<Service>,
}

impl Registar for Services {
    fn register_on(&self, registry: &Registry) -> anyhow::Result<()> {
        self.legacy_registry.register_on(registry)?;
        self.current_registry.register_on(registry)?;
        Ok(())
    }
}

pub struct Execution {
    pub execution_time_seconds: Gauge,
    pub outcome: Gauge,
    pub last_stage: GaugeVec,
}

impl Registar for Execution {
    fn register_on(&self, registry: &Registry) -> anyhow::Result<()> {
        registry.register(Box::new(self.execution_time_seconds.clone()))?;
        registry.register(Box::new(self.outcome.clone()))?;
        registry.register(Box::new(self.last_stage.clone()))?;
        Ok(())
    }
}

pub fn register_int_counter_vec(namespace: &str, name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let opts = Opts::new(name, help).namespace(namespace.to_string());
    IntCounterVec::new(opts, labels).unwrap()
}

pub fn register_gauge(namespace: &str, name: &str, help: &str) -> Gauge {
    let opts = Opts::new(name, help).namespace(namespace.to_string());
    Gauge::with_opts(opts).unwrap()
}

pub fn register_gauge_vec(namespace: &str, name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    let opts = Opts::new(name, help).namespace(namespace.to_string());
    GaugeVec::new(opts, labels).unwrap()
}

pub fn register_histogram_vec(namespace: &str, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let opts = HistogramOpts::new(name, help).namespace(namespace.to_string());
    HistogramVec::new(opts, labels).unwrap()
}

pub fn build_service_metrics(namespace: &str, component: &str) -> Service {
    Service {
        call_count: register_int_counter_vec(
            namespace,
            &format!("external__{component}__call_count"),
            "Total call count",
            &["operation"],
        ),
        failure_count: register_int_counter_vec(
            namespace,
            &format!("external__{component}__failure_count"),
            "Failed call count",
            &["operation"],
        ),
        execution_time_seconds: register_histogram_vec(
            namespace,
            &format!("external__{component}__execution_time_seconds"),
            "Execution time in seconds",
            &["operation"],
        ),
    }
}

impl Metrics {
    pub fn new(namespace: &str) -> Self {
        let metadata = Metadata {
            network_chain: register_gauge_vec(
                namespace,
                "metadata__network_chain",
                "Network Chain ID",
                &["chain_name"],
            ),
            run_counter: register_int_counter_vec(
                namespace,
                "metadata__migration_runs",
                "Number of migration runs",
                &["operation"],
            ),
        };

        let services = Services {
            legacy_registry: Arc::new(build_service_metrics(namespace, "legacy_registry")),
            current_registry: Arc::new(build_service_metrics(namespace, "current_registry")),
        };

        let execution = Execution {
            execution_time_seconds: register_gauge(
                namespace,
                "execution__execution_time_seconds",
                "Total execution time",
            ),
            outcome: register_gauge(namespace, "execution__execution_outcome", "Execution outcome"),
            last_stage: register_gauge_vec(
                namespace,
                "execution__last_stage",
                "Stage the migration ended in",
                &["stage"],
            ),
        };

        Metrics {
            metadata,
            services,
            execution,
        }
    }
}

/// Dumps the registry in text exposition format for the node exporter textfile collector.
pub fn write_textfile(registry: &Registry, path: &Path) -> anyhow::Result<()> {
    let encoded = TextEncoder::new().encode_to_string(&registry.gather())?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, encoded)?;
    Ok(())
}
