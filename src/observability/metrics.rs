use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub rides_total: IntCounterVec,
    pub location_updates_total: IntCounter,
    pub drivers_available: IntGauge,
    pub nearby_search_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let rides_total = IntCounterVec::new(
            Opts::new("rides_total", "Ride status transitions by status"),
            &["status"],
        )
        .expect("valid rides_total metric");

        let location_updates_total = IntCounter::new(
            "location_updates_total",
            "Total driver location pings received",
        )
        .expect("valid location_updates_total metric");

        let drivers_available =
            IntGauge::new("drivers_available", "Current number of available drivers")
                .expect("valid drivers_available metric");

        let nearby_search_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "nearby_search_latency_seconds",
                "Latency of proximity searches in seconds",
            ),
            &["outcome"],
        )
        .expect("valid nearby_search_latency_seconds metric");

        registry
            .register(Box::new(rides_total.clone()))
            .expect("register rides_total");
        registry
            .register(Box::new(location_updates_total.clone()))
            .expect("register location_updates_total");
        registry
            .register(Box::new(drivers_available.clone()))
            .expect("register drivers_available");
        registry
            .register(Box::new(nearby_search_latency_seconds.clone()))
            .expect("register nearby_search_latency_seconds");

        Self {
            registry,
            rides_total,
            location_updates_total,
            drivers_available,
            nearby_search_latency_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
