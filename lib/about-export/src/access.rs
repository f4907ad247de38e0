//! Access observers for the aggregator's HTTP surface

use about_core::MetricsCollector;
use hyper::{header, Request, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Paths recorded verbatim in metric labels, anything else becomes "other"
const KNOWN_ROUTES: [&str; 4] = ["/__/about", "/reload", "/metrics", "/healthz"];

/// What an observer gets to see of a request
#[derive(Clone, Debug)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    pub user_agent: Option<String>,
    pub received: Instant,
}

impl RequestInfo {
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self {
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            user_agent: req
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            received: Instant::now(),
        }
    }

    /// Path as a bounded metric label
    pub fn route(&self) -> &str {
        KNOWN_ROUTES
            .iter()
            .find(|route| **route == self.path)
            .copied()
            .unwrap_or("other")
    }

    pub fn elapsed(&self) -> Duration {
        self.received.elapsed()
    }
}

/// Hook notified before routing and once the response status is known
pub trait AccessObserver: Send + Sync {
    fn on_request(&self, _request: &RequestInfo) {}

    fn on_response(&self, _request: &RequestInfo, _status: StatusCode) {}
}

/// Ordered set of observers; responses are seen in reverse order
#[derive(Clone, Default)]
pub struct Observers {
    observers: Vec<Arc<dyn AccessObserver>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<O: AccessObserver + 'static>(mut self, observer: O) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn request(&self, request: &RequestInfo) {
        for observer in &self.observers {
            observer.on_request(request);
        }
    }

    pub fn response(&self, request: &RequestInfo, status: StatusCode) {
        for observer in self.observers.iter().rev() {
            observer.on_response(request, status);
        }
    }
}

/// One info line per answered request
pub struct AccessLog;

impl AccessObserver for AccessLog {
    fn on_response(&self, request: &RequestInfo, status: StatusCode) {
        info!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            duration_ms = request.elapsed().as_millis() as u64,
            user_agent = request.user_agent.as_deref().unwrap_or("-"),
            "{} {} -> {}",
            request.method,
            request.path,
            status.as_u16()
        );
    }
}

/// Request counts, response codes and latency in the shared registry
pub struct HttpMetrics {
    collector: MetricsCollector,
}

impl HttpMetrics {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }
}

impl AccessObserver for HttpMetrics {
    fn on_request(&self, request: &RequestInfo) {
        self.collector
            .http_requests_total
            .with_label_values(&[request.method.as_str(), request.route()])
            .inc();
    }

    fn on_response(&self, request: &RequestInfo, status: StatusCode) {
        self.collector
            .http_responses_total
            .with_label_values(&[status.as_str()])
            .inc();
        self.collector
            .http_request_duration_seconds
            .with_label_values(&[request.method.as_str(), request.route()])
            .observe(request.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn info(path: &str) -> RequestInfo {
        let req = Request::builder()
            .method("GET")
            .uri(path)
            .header("user-agent", "curl/8.0")
            .body(())
            .unwrap();
        RequestInfo::from_request(&req)
    }

    #[test]
    fn test_request_info() {
        let request = info("/__/about");
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/__/about");
        assert_eq!(request.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(request.route(), "/__/about");
    }

    #[test]
    fn test_unknown_paths_share_one_route() {
        assert_eq!(info("/wp-login.php").route(), "other");
        assert_eq!(info("/__/about/extra").route(), "other");
    }

    struct Recording {
        tag: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl AccessObserver for Recording {
        fn on_request(&self, _request: &RequestInfo) {
            self.seen.lock().unwrap().push(format!("{}:request", self.tag));
        }

        fn on_response(&self, _request: &RequestInfo, status: StatusCode) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.tag, status.as_u16()));
        }
    }

    #[test]
    fn test_responses_unwind_in_reverse() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observers = Observers::new()
            .with(Recording { tag: "outer", seen: seen.clone() })
            .with(Recording { tag: "inner", seen: seen.clone() });
        assert_eq!(observers.len(), 2);

        let request = info("/healthz");
        observers.request(&request);
        observers.response(&request, StatusCode::OK);

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["outer:request", "inner:request", "inner:200", "outer:200"]
        );
    }

    #[test]
    fn test_http_metrics() {
        let collector = MetricsCollector::new().unwrap();
        let observers = Observers::new()
            .with(AccessLog)
            .with(HttpMetrics::new(collector.clone()));

        for path in ["/__/about", "/nope", "/also-nope"] {
            let request = info(path);
            observers.request(&request);
            observers.response(&request, StatusCode::NOT_FOUND);
        }

        let requests = &collector.http_requests_total;
        assert_eq!(requests.with_label_values(&["GET", "/__/about"]).get(), 1);
        assert_eq!(requests.with_label_values(&["GET", "other"]).get(), 2);
        assert_eq!(
            collector.http_responses_total.with_label_values(&["404"]).get(),
            3
        );
        assert!(collector
            .gather()
            .unwrap()
            .contains("http_request_duration_seconds"));
    }
}
