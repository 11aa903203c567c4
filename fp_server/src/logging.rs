//! Structured logging configuration.
//!
//! The subscriber also receives `log` records, so events emitted by the
//! `fingerprint` library show up alongside the server's own.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var.
///
/// # Example
///
/// ```no_run
/// use fp_server::logging;
///
/// logging::init();
/// tracing::info!("Server starting");
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log security event with structured data
///
/// Never pass passwords, hashes, tokens or reset values in `subject` or
/// `message`.
///
/// # Example
///
/// ```
/// use fp_server::logging::log_security_event;
///
/// log_security_event("failed_login", Some("a@b.com"), "Invalid password attempt");
/// ```
pub fn log_security_event(event_type: &str, subject: Option<&str>, message: &str) {
    tracing::warn!(
        event_type = event_type,
        subject = subject,
        "SECURITY: {}",
        message
    );
}

/// Log API request/response
pub fn log_api_request(
    request_id: &str,
    method: &str,
    path: &str,
    status_code: u16,
    duration_ms: u64,
) {
    tracing::info!(
        request_id = request_id,
        http_method = method,
        http_path = path,
        http_status = status_code,
        duration_ms = duration_ms,
        "API request completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, f);
        let bytes = out.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_log_security_event() {
        let output = capture(|| {
            log_security_event("failed_login", Some("a@b.com"), "Invalid login attempt");
        });

        assert_eq!(output.lines().count(), 1);
        assert!(output.contains("WARN"));
        assert!(output.contains("SECURITY: Invalid login attempt"));
        assert!(output.contains("failed_login"));
        assert!(output.contains("a@b.com"));
    }

    #[test]
    fn test_log_security_event_without_subject() {
        let output = capture(|| log_security_event("token_rejected", None, "Bad token"));

        assert!(output.contains("SECURITY: Bad token"));
        assert!(!output.contains("subject"));
    }

    #[test]
    fn test_log_api_request() {
        let output = capture(|| log_api_request("req-1", "GET", "/api/users", 200, 45));

        assert!(output.contains("INFO"));
        assert!(output.contains("API request completed"));
        assert!(output.contains("req-1"));
        assert!(output.contains("/api/users"));
        assert!(output.contains("http_status=200"));
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
