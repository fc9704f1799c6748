//! Location provider fed by fixes relayed from the client device

use super::{LocationProvider, Position, PositionError, PositionRequest};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

struct Reading {
    received_at: Instant,
    result: Result<Position, PositionError>,
}

/// Holds the most recent fix (or failure) reported by the client
///
/// A request only accepts a reading received within its `maximum_age`
/// bound, so with `maximum_age = 0` anything reported before the request
/// was issued is stale and ignored.
#[derive(Default)]
pub struct RelayLocationProvider {
    latest: Mutex<Option<Reading>>,
    notify: Notify,
}

impl RelayLocationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fix or device failure reported by the client
    pub fn report(&self, result: Result<Position, PositionError>) {
        let reading = Reading {
            received_at: Instant::now(),
            result,
        };
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(reading);
        }
        self.notify.notify_waiters();
    }

    fn fresh_reading(&self, request: &PositionRequest) -> Option<Result<Position, PositionError>> {
        let latest = self.latest.lock().ok()?;
        latest
            .as_ref()
            .filter(|r| request.accepts_fix_from(r.received_at))
            .map(|r| r.result)
    }
}

#[async_trait]
impl LocationProvider for RelayLocationProvider {
    async fn current_position(&self, request: &PositionRequest) -> Result<Position, PositionError> {
        loop {
            // Register interest before checking so a report in between is not lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.fresh_reading(request) {
                return result;
            }

            debug!("Waiting for relayed location fix");
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_fix_reported_before_request_is_stale() {
        let relay = Arc::new(RelayLocationProvider::new());
        relay.report(Ok(Position::new(1.0, 2.0)));

        tokio::time::advance(Duration::from_millis(10)).await;
        let request = PositionRequest::fresh(Duration::from_secs(10));

        let waiting = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.current_position(&request).await })
        };
        tokio::time::advance(Duration::from_millis(10)).await;
        relay.report(Ok(Position::new(3.0, 4.0)));

        let fix = waiting.await.unwrap().unwrap();
        assert_eq!(fix, Position::new(3.0, 4.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fix_reported_after_issue_but_before_wait_is_used() {
        let relay = RelayLocationProvider::new();
        let request = PositionRequest::fresh(Duration::from_secs(10));
        tokio::time::advance(Duration::from_millis(5)).await;
        relay.report(Err(PositionError::PermissionDenied));

        assert_eq!(
            relay.current_position(&request).await,
            Err(PositionError::PermissionDenied)
        );
    }
}
