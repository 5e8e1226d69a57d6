use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Port the Prometheus scrape endpoint listens on.
const METRICS_PORT: u16 = 9000;

/// Installs the global metrics recorder and serves it on `[::]:9000/metrics`.
///
/// Every metric gets an `app` label with `app_name`.
pub fn init_metrics(app_name: &str) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(
            IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            METRICS_PORT,
        ))
        .add_global_label("app", app_name)
        .install()?;

    Ok(())
}
