use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::health::HealthChecker;

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Pull-based exposition endpoint on the local metrics port.
pub struct MetricsServer {
    health_checker: Arc<HealthChecker>,
    port: u16,
}

impl MetricsServer {
    pub fn new(health_checker: Arc<HealthChecker>, port: u16) -> Self {
        Self { health_checker, port }
    }

    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(("127.0.0.1", self.port)).await
    }

    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        info!(addr = %listener.local_addr()?, "Metrics server listening");

        loop {
            let (mut socket, peer) = listener.accept().await?;
            let health_checker = Arc::clone(&self.health_checker);

            tokio::spawn(async move {
                let mut buffer = [0; 1024];
                let n = match socket.read(&mut buffer).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };

                let request = String::from_utf8_lossy(&buffer[..n]);
                let response = Self::handle_request(&request, &health_checker);
                debug!(%peer, "Served metrics request");

                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    }

    pub fn handle_request(request: &str, health_checker: &HealthChecker) -> String {
        let Some(request_line) = request.lines().next() else {
            return Self::error_response(400, "Bad Request");
        };
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() < 2 {
            return Self::error_response(400, "Bad Request");
        }

        match (parts[0], parts[1]) {
            ("GET", "/metrics") => match health_checker.export_metrics() {
                Some(Ok(text)) => Self::response(200, "OK", OPENMETRICS_CONTENT_TYPE, &text),
                Some(Err(_)) => Self::error_response(500, "Internal Server Error"),
                None => Self::error_response(404, "Metrics Disabled"),
            },
            ("GET", "/health") => match serde_json::to_string(&health_checker.get_health()) {
                Ok(json) if health_checker.is_healthy() => Self::json_response(200, &json),
                Ok(json) => Self::response(503, "Service Unavailable", "application/json", &json),
                Err(_) => Self::error_response(500, "Internal Server Error"),
            },
            ("GET", "/status") => {
                match serde_json::to_string(&health_checker.get_detailed_status()) {
                    Ok(json) => Self::json_response(200, &json),
                    Err(_) => Self::error_response(500, "Internal Server Error"),
                }
            }
            _ => Self::error_response(404, "Not Found"),
        }
    }

    fn response(status: u16, reason: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reason,
            content_type,
            body.len(),
            body
        )
    }

    fn json_response(status: u16, body: &str) -> String {
        Self::response(status, "OK", "application/json", body)
    }

    fn error_response(status: u16, message: &str) -> String {
        let body = format!("{{\"error\": \"{}\"}}", message);
        Self::response(status, message, "application/json", &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::metrics::{ErrorType, MetricsCollector, MetricsSink};
    use crate::prometheus_metrics::PrometheusMetrics;
    use crate::types::HashrateSample;
    use std::time::Duration;

    fn checker(with_prometheus: bool) -> HealthChecker {
        let prometheus = with_prometheus.then(PrometheusMetrics::new);
        let metrics = Arc::new(MetricsCollector::new(prometheus));
        metrics.record_batch(256, Duration::from_millis(1), HashrateSample { hashes_per_sec: 1e6 });
        HealthChecker::new(metrics, Config::default())
    }

    #[test]
    fn metrics_route_serves_exposition() {
        let resp = MetricsServer::handle_request("GET /metrics HTTP/1.1\r\n\r\n", &checker(true));
        assert!(resp.starts_with("HTTP/1.1 200 OK"));
        assert!(resp.contains("mining_hashrate_mhs 1.0"));
    }

    #[test]
    fn metrics_route_reports_disabled_export() {
        let resp = MetricsServer::handle_request("GET /metrics HTTP/1.1\r\n\r\n", &checker(false));
        assert!(resp.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn health_and_status_are_json() {
        let c = checker(true);
        let resp = MetricsServer::handle_request("GET /health HTTP/1.1\r\n\r\n", &c);
        assert!(resp.contains("\"status\":\"healthy\""));
        let resp = MetricsServer::handle_request("GET /status HTTP/1.1\r\n\r\n", &c);
        assert!(resp.contains("\"batch_size\":256"));
        assert!(c.is_healthy());
    }

    #[test]
    fn health_is_unavailable_after_repeated_device_failures() {
        let metrics = Arc::new(MetricsCollector::default());
        metrics.record_error(ErrorType::Device);
        let c = HealthChecker::new(Arc::clone(&metrics), Config::default());
        assert!(c.is_healthy(), "degraded still serves");

        metrics.record_error(ErrorType::Device);
        assert!(!c.is_healthy());
        let resp = MetricsServer::handle_request("GET /health HTTP/1.1\r\n\r\n", &c);
        assert!(resp.starts_with("HTTP/1.1 503 Service Unavailable"));
        assert!(resp.contains("\"status\":\"critical\""));
    }

    #[test]
    fn unknown_and_malformed_requests() {
        let c = checker(false);
        let resp = MetricsServer::handle_request("GET /nope HTTP/1.1", &c);
        assert!(resp.starts_with("HTTP/1.1 404"));
        assert!(MetricsServer::handle_request("", &c).starts_with("HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn serves_over_tcp() {
        let server = MetricsServer::new(Arc::new(checker(true)), 0);
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { server.serve(listener).await });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET /health HTTP/1.1\r\n\r\n").await.unwrap();
        let mut body = String::new();
        stream.read_to_string(&mut body).await.unwrap();
        assert!(body.starts_with("HTTP/1.1 200 OK"));
    }
}
