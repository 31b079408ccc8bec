mod memory;
#[cfg(feature = "mqtt")]
mod mqtt;
mod path;
mod tree;

pub use memory::*;
#[cfg(feature = "mqtt")]
pub use mqtt::*;
pub use path::*;
pub use tree::*;

use serde_json::{Map, Value};
use std::future::Future;
use thiserror::Error;
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinError};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid store path: {0}")]
    InvalidPath(String),
    #[error("Cannot push to {0}, it is not a collection")]
    NotACollection(StorePath),
    #[error("Error (de)serializing store value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "mqtt")]
    #[error("Mqtt Client error: {0}")]
    MqttClient(#[from] rumqttc::ClientError),
    #[error("Error waiting for store task to complete: {0}")]
    JoinError(#[from] JoinError),
    #[error("Store channel is closed.")]
    ChannelClosed,
}

/// Change notification delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The full current value at `path`, `None` when nothing is stored there.
    Value { path: StorePath, value: Option<Value> },
    /// A child was added below the collection at `path`.
    ChildAdded {
        path: StorePath,
        key: String,
        value: Value,
    },
}

impl StoreEvent {
    pub fn path(&self) -> &StorePath {
        match self {
            StoreEvent::Value { path, .. } => path,
            StoreEvent::ChildAdded { path, .. } => path,
        }
    }
}

/// Selects the children a child subscription reports.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChildQuery {
    pub equal_to: Option<(String, Value)>,
    pub limit_to_last: Option<usize>,
}

impl ChildQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only children whose field `child` equals `value`.
    pub fn order_by_child_equal_to(mut self, child: impl Into<String>, value: Value) -> Self {
        self.equal_to = Some((child.into(), value));
        self
    }

    /// Only the last `limit` existing children are reported on subscription.
    pub fn limit_to_last(mut self, limit: usize) -> Self {
        self.limit_to_last = Some(limit);
        self
    }

    pub fn matches(&self, child: &Value) -> bool {
        match &self.equal_to {
            Some((field, expected)) => child.get(field) == Some(expected),
            None => true,
        }
    }
}

/// Stops the delivery of a subscription once cancelled.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionHandle {
    token: CancellationToken,
}

impl SubscriptionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: UnboundedReceiver<StoreEvent>,
}

impl Subscription {
    /// Next event, or `None` once the subscription is cancelled or the store
    /// dropped it. Cancelling ends a pending `recv` right away.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        if self.handle.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = self.handle.token.cancelled() => None,
            event = self.events.recv() => event,
        }
    }
}

/// The realtime store the dashboard mirrors.
///
/// Value subscriptions deliver the current value immediately and again after
/// every write that touches it. Writes are independent of each other, there
/// is no transaction across several paths.
pub trait RemoteStore: Clone + Send + Sync + 'static {
    fn subscribe_value(
        &self,
        path: StorePath,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;

    fn subscribe_children(
        &self,
        path: StorePath,
        query: ChildQuery,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;

    /// Replaces the value at `path`; `Value::Null` removes it.
    fn set(
        &self,
        path: StorePath,
        value: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Shallow merge of `fields` into the object at `path`; null fields are removed.
    fn update(
        &self,
        path: StorePath,
        fields: Map<String, Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn remove(&self, path: StorePath) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Appends `value` to a collection under a new chronologically ordered
    /// key and returns that key.
    fn push(
        &self,
        path: StorePath,
        value: Value,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;
}
