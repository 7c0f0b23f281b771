//! Sync metrics for observability

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<SyncMetricsInner> = OnceLock::new();

struct SyncMetricsInner {
    page_fetches: CounterVec,
    profile_fetches: CounterVec,
    follow_toggles: CounterVec,
}

impl SyncMetricsInner {
    fn new() -> Self {
        Self {
            page_fetches: CounterVec::new(
                Opts::new(
                    "profile_sync_page_fetches_total",
                    "Feed page fetches by outcome",
                ),
                &["outcome"],
            )
            .expect("valid metric definition"),
            profile_fetches: CounterVec::new(
                Opts::new(
                    "profile_sync_profile_fetches_total",
                    "Profile fetches by outcome",
                ),
                &["outcome"],
            )
            .expect("valid metric definition"),
            follow_toggles: CounterVec::new(
                Opts::new(
                    "profile_sync_follow_toggles_total",
                    "Follow toggles by outcome",
                ),
                &["outcome"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.page_fetches.clone()))?;
        registry.register(Box::new(self.profile_fetches.clone()))?;
        registry.register(Box::new(self.follow_toggles.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static SyncMetricsInner {
    METRICS.get_or_init(SyncMetricsInner::new)
}

#[derive(Clone, Default)]
pub struct SyncMetrics;

impl SyncMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    /// `outcome`: appended, failed, discarded
    pub fn record_page_fetch(&self, outcome: &str) {
        get_metrics()
            .page_fetches
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_profile_fetch(&self, outcome: &str) {
        get_metrics()
            .profile_fetches
            .with_label_values(&[outcome])
            .inc();
    }

    /// `outcome`: confirmed, corrected, rolled_back, discarded
    pub fn record_toggle(&self, outcome: &str) {
        get_metrics()
            .follow_toggles
            .with_label_values(&[outcome])
            .inc();
    }
}
