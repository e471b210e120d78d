//! Event notifications to collaborating services.
//!
//! Targets are opaque webhooks with no delivery guarantee; the storage
//! core never depends on their success. All sends are fire-and-forget:
//! failures are logged and dropped.

use serde_json::json;

use crate::config::NotifyTarget;

/// Manages all configured notification targets.
pub struct NotificationManager {
    client: reqwest::Client,
    targets: Vec<NotifyTarget>,
}

impl NotificationManager {
    pub fn new(targets: &[NotifyTarget]) -> Self {
        Self {
            client: reqwest::Client::new(),
            targets: targets.iter().filter(|t| t.enabled).cloned().collect(),
        }
    }

    /// Check if there are any enabled notification targets
    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    /// Post an event to every target. Errors are logged, never propagated.
    pub async fn notify(&self, event: &str, payload: serde_json::Value) {
        for target in &self.targets {
            let body = json!({
                "event": event,
                "payload": payload,
            });

            match self.client.post(&target.url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!("Notified '{}' of {}", target.name, event);
                }
                Ok(response) => {
                    tracing::warn!(
                        "Notify target '{}' answered {} for {}",
                        target.name,
                        response.status(),
                        event
                    );
                }
                Err(e) => {
                    tracing::warn!("Failed to notify '{}' of {}: {}", target.name, event, e);
                }
            }
        }
    }
}
