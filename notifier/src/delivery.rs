use crate::metrics_defs::{DELIVERY_ATTEMPT, DELIVERY_EXHAUSTED};
use crate::retry::RetryPolicy;
use crate::transport::{DeliveryError, WebhookTransport};
use serde_json::Value;
use shared::counter;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum NotificationError {
    #[error("notification delivery exhausted after {attempts} attempts: {last_error}")]
    DeliveryExhausted {
        attempts: u32,
        last_error: DeliveryError,
    },
}

/// Best-effort webhook delivery with bounded retries.
///
/// Failures never reach the caller: exhausted deliveries are logged together
/// with the payload so an operator can resend it by hand.
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn WebhookTransport>,
    policy: RetryPolicy,
}

impl Notifier {
    pub fn new(transport: Arc<dyn WebhookTransport>, policy: RetryPolicy) -> Self {
        Notifier { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs the delivery as an independent task, detached from the caller.
    pub fn spawn(&self, url: Url, payload: Value) -> JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move { notifier.deliver(&url, &payload).await })
    }

    pub async fn deliver(&self, url: &Url, payload: &Value) {
        match self.attempt_delivery(url, payload).await {
            Ok(attempts) => {
                tracing::info!(attempts, "Notification delivered");
            }
            Err(err) => {
                counter!(DELIVERY_EXHAUSTED).increment(1);
                tracing::error!(
                    error = %err,
                    payload = %payload,
                    "Giving up on notification, payload was not delivered"
                );
            }
        }
    }

    async fn attempt_delivery(&self, url: &Url, payload: &Value) -> Result<u32, NotificationError> {
        let mut attempt = 1;

        loop {
            match self.transport.post(url, payload).await {
                Ok(()) => {
                    counter!(DELIVERY_ATTEMPT, "result" => "success").increment(1);
                    return Ok(attempt);
                }
                Err(err) => {
                    counter!(DELIVERY_ATTEMPT, "result" => "failure").increment(1);
                    if attempt >= self.policy.max_attempts {
                        return Err(NotificationError::DeliveryExhausted {
                            attempts: attempt,
                            last_error: err,
                        });
                    }
                    tracing::warn!(attempt, error = %err, "Notification attempt failed, retrying");
                }
            }

            sleep(self.policy.backoff()).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::RecordingTransport;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::io;
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock())
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(2500),
            max_jitter: Duration::from_millis(500),
        }
    }

    fn url() -> Url {
        Url::parse("https://hooks.example.com/rank").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let transport = Arc::new(RecordingTransport::failing_first(0));
        let notifier = Notifier::new(transport.clone(), policy(10));
        let start = Instant::now();

        let attempts = notifier
            .attempt_delivery(&url(), &json!({"content": "hi"}))
            .await
            .unwrap();

        assert_eq!(attempts, 1);
        assert_eq!(transport.attempts(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_k_failures() {
        for k in [1_usize, 3, 9] {
            let transport = Arc::new(RecordingTransport::failing_first(k));
            let notifier = Notifier::new(transport.clone(), policy(10));

            notifier.deliver(&url(), &json!({"content": "hi"})).await;

            assert_eq!(transport.attempts(), k + 1);
            // Nothing else is attempted after the success.
            tokio::time::sleep(Duration::from_secs(60)).await;
            assert_eq!(transport.attempts(), k + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts() {
        let transport = Arc::new(RecordingTransport::always_failing());
        let notifier = Notifier::new(transport.clone(), policy(10));

        let err = notifier
            .attempt_delivery(&url(), &json!({"content": "hi"}))
            .await
            .unwrap_err();

        let NotificationError::DeliveryExhausted { attempts, .. } = err;
        assert_eq!(attempts, 10);
        assert_eq!(transport.attempts(), 10);

        let times = transport.attempt_times();
        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_millis(2500), "gap {gap:?} too short");
            assert!(gap <= Duration::from_millis(3000), "gap {gap:?} too long");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_delivery_absorbs_failure() {
        let transport = Arc::new(RecordingTransport::always_failing());
        let notifier = Notifier::new(transport.clone(), policy(3));

        let handle = notifier.spawn(url(), json!({"content": "lost"}));

        // The task finishes normally even though every attempt failed.
        handle.await.unwrap();
        assert_eq!(transport.attempts(), 3);
        assert_eq!(transport.payloads()[0], json!({"content": "lost"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_logs_payload_at_error_level() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let transport = Arc::new(RecordingTransport::always_failing());
        let notifier = Notifier::new(transport.clone(), policy(3));
        notifier.deliver(&url(), &json!({"content": "lost"})).await;

        let lines = logs.lines();
        let warnings = lines.iter().filter(|line| line.contains("WARN")).count();
        assert_eq!(warnings, 2);

        let errors: Vec<_> = lines.iter().filter(|line| line.contains("ERROR")).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Giving up on notification"));
        assert!(errors[0].contains(r#"payload={"content":"lost"}"#));
        assert!(errors[0].contains("3 attempts"), "{}", errors[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policy_never_sleeps() {
        let transport = Arc::new(RecordingTransport::always_failing());
        let notifier = Notifier::new(transport.clone(), policy(1));
        let start = Instant::now();

        notifier.deliver(&url(), &json!({})).await;

        assert_eq!(transport.attempts(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
