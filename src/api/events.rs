//! Lifecycle event publishing.
//!
//! Every committed lifecycle transition (signup, activation, email change,
//! password change, profile edit, sign-in/out) emits an [`AccountEvent`].
//! Handlers enqueue events on an unbounded channel and return immediately;
//! a background task hands each event to an [`EventSink`]. The sink decides
//! how to react (send mail, append to an audit log, publish to a broker)
//! and returns `Ok`/`Err`.
//!
//! Delivery is fire-and-forget and best-effort: a failing sink is logged
//! and never unwinds the operation that produced the event, which has
//! already committed by the time the event is enqueued. Events that need
//! out-of-band delivery (activation, email confirmation) carry the raw
//! token so a mailer sink can build the link; tokens are never persisted
//! raw and never returned in HTTP responses.
//!
//! The default sink for local dev is `LogEventSink`, which logs and
//! returns `Ok(())`.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info};

/// Events emitted after a lifecycle transition has committed.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AccountEvent {
    SignupComplete {
        username: String,
        email: String,
        /// Present unless activation was skipped by configuration.
        activation_token: Option<String>,
    },
    Activated {
        username: String,
        email: String,
    },
    ActivationReissued {
        username: String,
        email: String,
        activation_token: String,
    },
    EmailChangeRequested {
        username: String,
        new_email: String,
        confirmation_token: String,
    },
    EmailChanged {
        username: String,
        prev_email: String,
        new_email: String,
    },
    PasswordChanged {
        username: String,
    },
    ProfileChanged {
        username: String,
    },
    SignedIn {
        username: String,
    },
    SignedOut {
        username: String,
    },
}

impl AccountEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SignupComplete { .. } => "signup_complete",
            Self::Activated { .. } => "activated",
            Self::ActivationReissued { .. } => "activation_reissued",
            Self::EmailChangeRequested { .. } => "email_change_requested",
            Self::EmailChanged { .. } => "email_changed",
            Self::PasswordChanged { .. } => "password_changed",
            Self::ProfileChanged { .. } => "profile_changed",
            Self::SignedIn { .. } => "signed_in",
            Self::SignedOut { .. } => "signed_out",
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        match self {
            Self::SignupComplete { username, .. }
            | Self::Activated { username, .. }
            | Self::ActivationReissued { username, .. }
            | Self::EmailChangeRequested { username, .. }
            | Self::EmailChanged { username, .. }
            | Self::PasswordChanged { username }
            | Self::ProfileChanged { username }
            | Self::SignedIn { username }
            | Self::SignedOut { username } => username,
        }
    }
}

/// Event delivery abstraction used by the background worker.
pub trait EventSink: Send + Sync {
    /// Deliver an event or return an error to have it logged as lost.
    ///
    /// # Errors
    /// Returns an error when delivery fails; the worker logs and moves on.
    fn deliver(&self, event: &AccountEvent) -> Result<()>;
}

/// Local dev sink that logs the payload instead of delivering anywhere.
#[derive(Clone, Debug)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn deliver(&self, event: &AccountEvent) -> Result<()> {
        let payload = serde_json::to_string(event).unwrap_or_else(|_| event.name().to_string());
        info!(
            event = event.name(),
            username = event.username(),
            payload = %payload,
            "account event sink stub"
        );
        Ok(())
    }
}

/// Handle used by request handlers to enqueue events without blocking.
#[derive(Clone)]
pub struct EventBus {
    tx: UnboundedSender<AccountEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> (Self, UnboundedReceiver<AccountEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue an event for the worker. Losing an event is observable in
    /// the logs but must not fail the operation that produced it.
    pub fn publish(&self, event: AccountEvent) {
        if let Err(err) = self.tx.send(event) {
            error!("failed to enqueue account event: {err}");
        }
    }
}

/// Spawn the background task draining the event queue into the sink.
pub fn spawn_event_worker(
    mut rx: UnboundedReceiver<AccountEvent>,
    sink: Arc<dyn EventSink>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(err) = sink.deliver(&event) {
                error!(
                    event = event.name(),
                    username = event.username(),
                    "account event delivery failed: {err}"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    struct CollectSink {
        seen: Mutex<Vec<String>>,
    }

    impl EventSink for CollectSink {
        fn deliver(&self, event: &AccountEvent) -> Result<()> {
            self.seen
                .lock()
                .expect("sink mutex poisoned")
                .push(event.name().to_string());
            Ok(())
        }
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn deliver(&self, _event: &AccountEvent) -> Result<()> {
            Err(anyhow!("listener down"))
        }
    }

    #[tokio::test]
    async fn worker_drains_queue_into_sink() {
        let (bus, rx) = EventBus::new();
        let sink = Arc::new(CollectSink {
            seen: Mutex::new(Vec::new()),
        });
        let worker = spawn_event_worker(rx, sink.clone());

        bus.publish(AccountEvent::SignupComplete {
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            activation_token: None,
        });
        bus.publish(AccountEvent::SignedIn {
            username: "alice".to_string(),
        });
        drop(bus);

        worker.await.expect("worker should finish after bus drop");
        let seen = sink.seen.lock().expect("sink mutex poisoned");
        assert_eq!(seen.as_slice(), ["signup_complete", "signed_in"]);
    }

    #[tokio::test]
    async fn worker_survives_sink_errors() {
        let (bus, rx) = EventBus::new();
        let worker = spawn_event_worker(rx, Arc::new(FailingSink));

        bus.publish(AccountEvent::PasswordChanged {
            username: "bob".to_string(),
        });
        bus.publish(AccountEvent::SignedOut {
            username: "bob".to_string(),
        });
        drop(bus);

        // Both events fail to deliver; the worker must still drain and exit.
        worker.await.expect("worker should not panic on sink errors");
    }

    #[test]
    fn event_serializes_with_tag() {
        let event = AccountEvent::EmailChanged {
            username: "alice".to_string(),
            prev_email: "old@x.com".to_string(),
            new_email: "new@x.com".to_string(),
        };
        let value = serde_json::to_value(&event).expect("event serializes");
        assert_eq!(value["event"], "email_changed");
        assert_eq!(value["prev_email"], "old@x.com");
        assert_eq!(value["new_email"], "new@x.com");
    }

    #[test]
    fn publish_after_worker_gone_is_lossy_not_fatal() {
        let (bus, rx) = EventBus::new();
        drop(rx);
        // Must not panic even though the receiver is gone.
        bus.publish(AccountEvent::SignedOut {
            username: "carol".to_string(),
        });
    }
}
