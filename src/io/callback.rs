//! Asynchronous event callback delivery
//!
//! One HTTP PUT per confirmed crossing, fire-and-forget. Delivery runs on
//! its own task so the sensing loop never waits on the network round trip.
//! Exactly one attempt: a failed or timed-out delivery is logged and
//! dropped, and the occupancy count is never rolled back.

use crate::domain::types::EventNotification;
use anyhow::Context;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct CallbackDispatcher {
    client: reqwest::Client,
}

impl CallbackDispatcher {
    /// Build the pooled client once, with a bounded per-request timeout
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .http1_only()
            .build()
            .context("failed to build callback HTTP client")?;
        Ok(Self { client })
    }

    /// Deliver `event` to `target` without blocking the caller
    ///
    /// No-op when no target is registered.
    pub fn dispatch(&self, target: Option<String>, event: EventNotification) {
        let Some(url) = target else {
            debug!(direction = %event.direction.as_str(), "callback_skipped_no_target");
            return;
        };

        let client = self.client.clone();
        tokio::spawn(async move {
            debug!(url = %url, direction = %event.direction.as_str(), "callback_sending");
            match client.put(&url).json(&event).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        url = %url,
                        status = %resp.status().as_u16(),
                        direction = %event.direction.as_str(),
                        people_inside = %event.people_inside,
                        "callback_delivered"
                    );
                }
                Ok(resp) => {
                    warn!(
                        url = %url,
                        status = %resp.status().as_u16(),
                        direction = %event.direction.as_str(),
                        "callback_rejected"
                    );
                }
                Err(e) => {
                    warn!(
                        url = %url,
                        direction = %event.direction.as_str(),
                        error = %e,
                        "callback_failed"
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Crossing, Direction};
    use chrono::Utc;

    fn event() -> EventNotification {
        let now = Utc::now();
        EventNotification::from_crossing(
            &Crossing { direction: Direction::Entry, started_at: now, ended_at: now },
            1,
        )
    }

    #[tokio::test]
    async fn test_dispatch_without_target_is_noop() {
        let dispatcher = CallbackDispatcher::new(Duration::from_millis(100)).unwrap();
        dispatcher.dispatch(None, event());
    }

    #[tokio::test]
    async fn test_dispatch_to_unreachable_target_does_not_error() {
        let dispatcher = CallbackDispatcher::new(Duration::from_millis(100)).unwrap();
        // Nothing listens here; the failure is logged on the spawned task
        dispatcher.dispatch(Some("http://127.0.0.1:9/cb".to_string()), event());
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
}
