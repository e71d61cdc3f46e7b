//! Row change notifications.
//!
//! A [`ChangeFeed`] hands out [`Subscription`]s. Every implementation in this
//! crate fans notifications out through a [`ChangeHub`], which also keeps a
//! per-channel count of open subscriptions so teardown is observable.
//!
//! Delivery is best-effort: there is no ordering guarantee across tables, and a
//! receiver that falls behind loses notifications. Consumers refetch whole
//! collections, so any later notification repairs a missed one.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use timberline_core::Table;

use crate::error::BackendError;

/// Broadcast buffer per hub.
pub const DEFAULT_CAPACITY: usize = 256;

/// The kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    Insert,
    Update,
    Delete,
}

impl ChangeEvent {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which change events a subscription wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventFilter {
    Insert,
    Update,
    Delete,
    /// `*`
    #[default]
    All,
}

impl EventFilter {
    #[must_use]
    pub const fn matches(&self, event: ChangeEvent) -> bool {
        matches!(
            (self, event),
            (Self::All, _)
                | (Self::Insert, ChangeEvent::Insert)
                | (Self::Update, ChangeEvent::Update)
                | (Self::Delete, ChangeEvent::Delete)
        )
    }

    /// Narrowest filter covering both.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        if self == other { self } else { Self::All }
    }
}

impl FromStr for EventFilter {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "*" => Ok(Self::All),
            s if s.eq_ignore_ascii_case("insert") => Ok(Self::Insert),
            s if s.eq_ignore_ascii_case("update") => Ok(Self::Update),
            s if s.eq_ignore_ascii_case("delete") => Ok(Self::Delete),
            other => Err(BackendError::Subscribe(format!("unknown event filter {other:?}"))),
        }
    }
}

/// A single change, as carried on the `timberline_changes` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub table: Table,
    pub event: ChangeEvent,
    #[serde(default)]
    pub id: Option<i64>,
}

/// Source of change subscriptions.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription on `channel` for `table` events matching `filter`.
    ///
    /// The subscription stays registered until it is dropped or
    /// [`Subscription::unsubscribe`] is called.
    async fn subscribe(
        &self,
        channel: &str,
        table: Table,
        filter: EventFilter,
    ) -> Result<Subscription, BackendError>;
}

type Registry = Arc<Mutex<BTreeMap<String, usize>>>;

/// In-process fan-out of change notifications plus the open-channel registry.
#[derive(Clone)]
pub struct ChangeHub {
    sender: broadcast::Sender<ChangeNotification>,
    registry: Registry,
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for ChangeHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeHub")
            .field("receivers", &self.sender.receiver_count())
            .field("channels", &self.active_channels())
            .finish()
    }
}

impl ChangeHub {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            registry: Arc::default(),
        }
    }

    /// Deliver a notification to every open subscription. Returns how many
    /// receivers saw it.
    pub fn publish(&self, notification: ChangeNotification) -> usize {
        self.sender.send(notification).unwrap_or(0)
    }

    /// Register a subscription on `channel`.
    #[must_use]
    pub fn open(&self, channel: &str, table: Table, filter: EventFilter) -> Subscription {
        *self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_insert(0) += 1;

        tracing::debug!(channel, %table, ?filter, "change subscription opened");

        Subscription {
            channel: channel.to_string(),
            table,
            filter,
            receiver: self.sender.subscribe(),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Channels with at least one open subscription, sorted.
    #[must_use]
    pub fn active_channels(&self) -> Vec<String> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

/// An open change subscription. Dropping it releases the channel.
pub struct Subscription {
    channel: String,
    table: Table,
    filter: EventFilter,
    receiver: broadcast::Receiver<ChangeNotification>,
    registry: Registry,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("table", &self.table)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    #[must_use]
    pub const fn table(&self) -> Table {
        self.table
    }

    #[must_use]
    pub const fn filter(&self) -> EventFilter {
        self.filter
    }

    /// Next matching notification, or `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<ChangeNotification> {
        loop {
            match self.receiver.recv().await {
                Ok(n) if n.table == self.table && self.filter.matches(n.event) => return Some(n),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        channel = %self.channel,
                        skipped,
                        "change subscription lagged, notifications dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Release the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = registry.get_mut(&self.channel) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                registry.remove(&self.channel);
            }
        }
        tracing::debug!(channel = %self.channel, "change subscription closed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn change(table: Table, event: ChangeEvent) -> ChangeNotification {
        ChangeNotification {
            table,
            event,
            id: Some(1),
        }
    }

    #[test]
    fn test_payload_wire_format() {
        let n: ChangeNotification =
            serde_json::from_str(r#"{"table":"products","event":"UPDATE","id":7}"#).unwrap();
        assert_eq!(n.table, Table::Products);
        assert_eq!(n.event, ChangeEvent::Update);
        assert_eq!(n.id, Some(7));

        let n: ChangeNotification =
            serde_json::from_str(r#"{"table":"faqs","event":"DELETE","id":null}"#).unwrap();
        assert_eq!(n.id, None);
    }

    #[test]
    fn test_filter_parsing_and_matching() {
        assert_eq!("*".parse::<EventFilter>().unwrap(), EventFilter::All);
        assert_eq!("INSERT".parse::<EventFilter>().unwrap(), EventFilter::Insert);
        assert!("upsert".parse::<EventFilter>().is_err());

        assert!(EventFilter::All.matches(ChangeEvent::Delete));
        assert!(!EventFilter::Insert.matches(ChangeEvent::Update));
        assert_eq!(EventFilter::Insert.union(EventFilter::Delete), EventFilter::All);
    }

    #[tokio::test]
    async fn test_subscription_filters_by_table_and_event() {
        let hub = ChangeHub::default();
        let mut sub = hub.open("db-changes:orders", Table::Orders, EventFilter::Insert);

        hub.publish(change(Table::Products, ChangeEvent::Insert));
        hub.publish(change(Table::Orders, ChangeEvent::Update));
        hub.publish(change(Table::Orders, ChangeEvent::Insert));

        let got = tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, change(Table::Orders, ChangeEvent::Insert));
    }

    #[test]
    fn test_registry_tracks_open_channels() {
        let hub = ChangeHub::default();
        let a = hub.open("db-changes:products", Table::Products, EventFilter::All);
        let b = hub.open("db-changes:products", Table::Products, EventFilter::All);
        let c = hub.open("admin:orders", Table::Orders, EventFilter::All);

        assert_eq!(
            hub.active_channels(),
            vec!["admin:orders".to_string(), "db-changes:products".to_string()]
        );

        a.unsubscribe();
        assert_eq!(hub.active_channels().len(), 2);
        drop(b);
        drop(c);
        assert!(hub.active_channels().is_empty());
    }
}
