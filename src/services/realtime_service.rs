use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::attendance::{RowKey, SubjectScope};
use crate::models::change_event::ChangeEvent;

/// Row filter of a subscription, the `user_id=eq.<id>` style expression a
/// realtime channel is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionFilter {
    UserId(Uuid),
    Date(NaiveDate),
}

impl SubscriptionFilter {
    pub fn for_scope(scope: &SubjectScope) -> Self {
        match scope {
            SubjectScope::Day { date } => SubscriptionFilter::Date(*date),
            SubjectScope::Member { user_id, .. } => SubscriptionFilter::UserId(*user_id),
        }
    }

    /// A key that lacks the filtered column cannot be excluded.
    pub fn matches(&self, key: &RowKey) -> bool {
        match self {
            SubscriptionFilter::UserId(id) => key.user_id.map_or(true, |u| u == *id),
            SubscriptionFilter::Date(date) => key.date.map_or(true, |d| d == *date),
        }
    }

    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        event.routing_keys().iter().any(|key| self.matches(key))
    }

    pub fn channel_name(&self) -> String {
        match self {
            SubscriptionFilter::UserId(id) => format!("public:attendance:user:{}", id),
            SubscriptionFilter::Date(date) => format!("public:attendance:date:{}", date),
        }
    }
}

impl fmt::Display for SubscriptionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionFilter::UserId(id) => write!(f, "user_id=eq.{}", id),
            SubscriptionFilter::Date(date) => write!(f, "date=eq.{}", date),
        }
    }
}

/// In-process fan-out of attendance changes to the open subscriptions.
#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    sender: broadcast::Sender<Arc<ChangeEvent>>,
    channels: Mutex<HashMap<Uuid, SubscriptionFilter>>,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(HubInner {
                sender,
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns how many subscriptions were handed the event.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let kind = event.kind();
        let delivered = self.inner.sender.send(Arc::new(event)).unwrap_or(0);
        debug!(kind, delivered, "published attendance change");
        delivered
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let id = Uuid::new_v4();
        let receiver = self.inner.sender.subscribe();
        self.channels().insert(id, filter);
        info!(subscription_id = %id, channel = %filter.channel_name(), filter = %filter, "subscribed to attendance changes");
        Subscription {
            id,
            filter,
            receiver,
        }
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> Result<()> {
        let Subscription { id, filter, .. } = subscription;
        match self.channels().remove(&id) {
            Some(_) => {
                info!(subscription_id = %id, filter = %filter, "unsubscribed from attendance changes");
                Ok(())
            }
            None => {
                warn!(subscription_id = %id, filter = %filter, "unsubscribe for an unknown channel");
                Err(Error::SubscriptionTeardown(format!(
                    "channel {} is not registered",
                    filter.channel_name()
                )))
            }
        }
    }

    pub fn active_channels(&self) -> Vec<(Uuid, SubscriptionFilter)> {
        self.channels()
            .iter()
            .map(|(id, filter)| (*id, *filter))
            .collect()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<Uuid, SubscriptionFilter>> {
        self.inner
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct Subscription {
    id: Uuid,
    filter: SubscriptionFilter,
    receiver: broadcast::Receiver<Arc<ChangeEvent>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filter(&self) -> SubscriptionFilter {
        self.filter
    }

    /// Next event for this subscription's rows, `None` once the hub is gone.
    /// Missed events surface as `ChangeEvent::Unknown` so the consumer
    /// resynchronizes.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.accepts(&event) => return Some((*event).clone()),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => return Some(lagged(missed)),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of `recv`; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.accepts(&event) => return Some((*event).clone()),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(missed)) => return Some(lagged(missed)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

fn lagged(missed: u64) -> ChangeEvent {
    warn!(missed, "attendance subscription lagged behind");
    ChangeEvent::Unknown {
        reason: format!("subscriber missed {} events", missed),
    }
}
