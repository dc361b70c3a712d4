//! Operation Events
//!
//! Lifecycle notifications for network-touching operations on proxies
//! (refresh, update, delete, batch fetches, creates). Subscribers are fixed
//! when the [`Client`](crate::Client) is built and are called synchronously on
//! the thread performing the operation.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Lifecycle state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventState {
    Started,
    /// Still running; emitted by long operations such as polling
    Progress,
    Finished,
    Failed,
}

impl EventState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Progress => "progress",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }

    /// True once the operation will not emit further events
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started | Self::Progress)
    }
}

/// Kind of operation being performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Refresh,
    Update,
    PartialUpdate,
    Delete,
    FetchBatch,
    Create,
    BulkCreate,
    BulkUpdate,
    BulkDelete,
    Poll,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::Update => "update",
            Self::PartialUpdate => "partial_update",
            Self::Delete => "delete",
            Self::FetchBatch => "fetch_next_batch",
            Self::Create => "create",
            Self::BulkCreate => "create_bulk",
            Self::BulkUpdate => "update_bulk",
            Self::BulkDelete => "delete_bulk",
            Self::Poll => "poll",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle notification
#[derive(Debug, Clone)]
pub struct OperationEvent {
    /// Shared by the Started event and its terminal event
    pub id: Uuid,
    /// Logical resource name
    pub resource: String,
    pub operation: Operation,
    pub state: EventState,
    pub url: Option<String>,
    pub at: DateTime<Utc>,
}

type Callback = Arc<dyn Fn(&OperationEvent) + Send + Sync>;

struct Subscription {
    resource: Option<String>,
    operation: Option<Operation>,
    /// `None` subscribes to every state, used only when no exact-state
    /// subscriber matches
    state: Option<EventState>,
    callback: Callback,
}

impl Subscription {
    fn matches_target(&self, event: &OperationEvent) -> bool {
        self.resource.as_deref().map_or(true, |r| r == event.resource)
            && self.operation.map_or(true, |op| op == event.operation)
    }
}

/// Immutable set of subscribers shared by every proxy of a client
#[derive(Clone, Default)]
pub struct EventHub {
    subscriptions: Arc<Vec<Subscription>>,
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl EventHub {
    pub fn builder() -> EventHubBuilder {
        EventHubBuilder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Deliver an event to matching subscribers.
    ///
    /// Subscribers registered for the exact state win; "any state"
    /// subscribers are the fallback.
    pub fn publish(&self, event: &OperationEvent) {
        if self.subscriptions.is_empty() {
            return;
        }

        let targeted: Vec<&Subscription> = self
            .subscriptions
            .iter()
            .filter(|s| s.matches_target(event))
            .collect();

        let exact: Vec<&&Subscription> = targeted
            .iter()
            .filter(|s| s.state == Some(event.state))
            .collect();

        if exact.is_empty() {
            for sub in targeted.iter().filter(|s| s.state.is_none()) {
                (sub.callback)(event);
            }
        } else {
            for sub in exact {
                (sub.callback)(event);
            }
        }
    }

    /// Run `op`, wrapping it in Started and Finished/Failed events
    pub(crate) fn track<T, E: fmt::Display>(
        &self,
        resource: &str,
        operation: Operation,
        url: Option<&str>,
        op: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        self.track_progress(resource, operation, url, |_| op())
    }

    /// Like [`track`](Self::track), handing `op` a callback that emits a
    /// Progress event under the same id
    pub(crate) fn track_progress<T, E: fmt::Display>(
        &self,
        resource: &str,
        operation: Operation,
        url: Option<&str>,
        op: impl FnOnce(&dyn Fn()) -> Result<T, E>,
    ) -> Result<T, E> {
        let id = Uuid::new_v4();
        let emit = |state: EventState| {
            self.publish(&OperationEvent {
                id,
                resource: resource.to_string(),
                operation,
                state,
                url: url.map(str::to_string),
                at: Utc::now(),
            });
        };

        emit(EventState::Started);
        let result = op(&|| emit(EventState::Progress));
        match &result {
            Ok(_) => emit(EventState::Finished),
            Err(e) => {
                tracing::debug!(resource, operation = %operation, error = %e, "Operation failed");
                emit(EventState::Failed);
            }
        }
        result
    }
}

/// Collects subscriptions before a client is built
#[derive(Default)]
pub struct EventHubBuilder {
    subscriptions: Vec<Subscription>,
}

impl EventHubBuilder {
    /// Subscribe to events. `None` acts as a wildcard for each filter.
    pub fn subscribe<F>(
        mut self,
        resource: Option<&str>,
        operation: Option<Operation>,
        state: Option<EventState>,
        callback: F,
    ) -> Self
    where
        F: Fn(&OperationEvent) + Send + Sync + 'static,
    {
        self.subscriptions.push(Subscription {
            resource: resource.map(str::to_string),
            operation,
            state,
            callback: Arc::new(callback),
        });
        self
    }

    pub fn build(self) -> EventHub {
        EventHub {
            subscriptions: Arc::new(self.subscriptions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Callback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_factory = log.clone();
        let factory = move |tag: &str| -> Callback {
            let log = log_for_factory.clone();
            let tag = tag.to_string();
            Arc::new(move |e: &OperationEvent| {
                log.lock()
                    .unwrap()
                    .push(format!("{}:{}:{}", tag, e.operation, e.state.as_str()));
            })
        };
        (log, factory)
    }

    fn hub_with(subs: Vec<(Option<&str>, Option<Operation>, Option<EventState>, Callback)>) -> EventHub {
        let mut builder = EventHub::builder();
        for (resource, operation, state, callback) in subs {
            builder = builder.subscribe(resource, operation, state, move |e| callback(e));
        }
        builder.build()
    }

    #[test]
    fn test_track_emits_started_and_finished() {
        let (log, cb) = recorder();
        let hub = hub_with(vec![(None, None, None, cb("any"))]);

        let result: Result<u32, String> = hub.track("entity_guid", Operation::Refresh, None, || Ok(7));
        assert_eq!(result, Ok(7));

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec!["any:refresh:started", "any:refresh:finished"]
        );
    }

    #[test]
    fn test_track_emits_failed() {
        let (log, cb) = recorder();
        let hub = hub_with(vec![(Some("glossary"), None, None, cb("g"))]);

        let result: Result<(), String> =
            hub.track("glossary", Operation::Delete, Some("http://x"), || Err("boom".into()));
        assert!(result.is_err());
        assert_eq!(log.lock().unwrap().last().unwrap(), "g:delete:failed");
    }

    #[test]
    fn test_exact_state_wins_over_any() {
        let (log, cb) = recorder();
        let hub = hub_with(vec![
            (None, Some(Operation::Update), None, cb("any")),
            (None, Some(Operation::Update), Some(EventState::Finished), cb("exact")),
        ]);

        let _: Result<(), String> = hub.track("entity_guid", Operation::Update, None, || Ok(()));

        let log = log.lock().unwrap();
        assert_eq!(*log, vec!["any:update:started", "exact:update:finished"]);
    }

    #[test]
    fn test_resource_filter() {
        let (log, cb) = recorder();
        let hub = hub_with(vec![(Some("typedefs"), None, None, cb("t"))]);

        let _: Result<(), String> = hub.track("entity_guid", Operation::Refresh, None, || Ok(()));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_progress_shares_operation_id() {
        let ids = Arc::new(Mutex::new(Vec::new()));
        let sink = ids.clone();
        let hub = EventHub::builder()
            .subscribe(None, Some(Operation::Poll), None, move |e| {
                sink.lock().unwrap().push((e.id, e.state));
            })
            .build();

        let _: Result<(), String> =
            hub.track_progress("entity_guid", Operation::Poll, None, |progress| {
                progress();
                progress();
                Ok(())
            });

        let ids = ids.lock().unwrap();
        let states: Vec<EventState> = ids.iter().map(|(_, state)| *state).collect();
        assert_eq!(
            states,
            vec![
                EventState::Started,
                EventState::Progress,
                EventState::Progress,
                EventState::Finished
            ]
        );
        assert!(ids.iter().all(|(id, _)| *id == ids[0].0));
    }

    #[test]
    fn test_state_terminality() {
        assert!(!EventState::Started.is_terminal());
        assert!(!EventState::Progress.is_terminal());
        assert!(EventState::Finished.is_terminal());
        assert!(EventState::Failed.is_terminal());
    }
}
