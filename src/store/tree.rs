use rand::{distr::Alphanumeric, rng, RngExt};
use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, UnboundedSender};

use super::{ChildQuery, StoreEvent, StorePath, Subscription, SubscriptionHandle};

#[derive(Debug)]
struct Subscriber {
    path: StorePath,
    // `None` for value subscriptions
    query: Option<ChildQuery>,
    sender: UnboundedSender<StoreEvent>,
    handle: SubscriptionHandle,
}

/// Local copy of the store as a json tree plus the subscribers interested in it.
///
/// Every write notifies value subscribers whose path overlaps the written path
/// with the full value at their own path, and child subscribers with each
/// child that did not exist before.
#[derive(Debug)]
pub struct StoreTree {
    root: Value,
    subscribers: Vec<Subscriber>,
    sequence: u64,
}

impl Default for StoreTree {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreTree {
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
            subscribers: Vec::new(),
            sequence: 0,
        }
    }

    pub fn get(&self, segments: &[&str]) -> Option<&Value> {
        lookup(&self.root, segments)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|sub| !sub.handle.is_cancelled() && !sub.sender.is_closed())
            .count()
    }

    pub fn subscribe_value(&mut self, path: StorePath) -> Subscription {
        let (sender, events) = mpsc::unbounded_channel();
        let handle = SubscriptionHandle::new();
        let value = self.get(&path.segments()).cloned();
        // the receiver is still in scope, this cannot fail
        let _ = sender.send(StoreEvent::Value {
            path: path.clone(),
            value,
        });
        self.subscribers.push(Subscriber {
            path,
            query: None,
            sender,
            handle: handle.clone(),
        });
        Subscription { handle, events }
    }

    pub fn subscribe_children(&mut self, path: StorePath, query: ChildQuery) -> Subscription {
        let (sender, events) = mpsc::unbounded_channel();
        let handle = SubscriptionHandle::new();
        if let Some(Value::Object(children)) = self.get(&path.segments()) {
            let matching: Vec<(&String, &Value)> = children
                .iter()
                .filter(|(_, child)| query.matches(child))
                .collect();
            let skip = query
                .limit_to_last
                .map(|limit| matching.len().saturating_sub(limit))
                .unwrap_or(0);
            for (key, value) in matching.into_iter().skip(skip) {
                let _ = sender.send(StoreEvent::ChildAdded {
                    path: path.clone(),
                    key: key.clone(),
                    value: value.clone(),
                });
            }
        }
        self.subscribers.push(Subscriber {
            path,
            query: Some(query),
            sender,
            handle: handle.clone(),
        });
        Subscription { handle, events }
    }

    /// Replaces the value at `segments`, a null value removes it.
    pub fn set(&mut self, segments: &[&str], value: Value) {
        let existed_before = self.get(segments).is_some();
        write_value(&mut self.root, segments, value);
        self.notify(segments, existed_before);
    }

    pub fn update(&mut self, segments: &[&str], fields: Map<String, Value>) {
        let existed_before = self.get(segments).is_some();
        for (field, value) in fields {
            let mut child = segments.to_vec();
            child.push(field.as_str());
            write_value(&mut self.root, &child, value);
        }
        self.notify(segments, existed_before);
    }

    pub fn remove(&mut self, segments: &[&str]) {
        self.set(segments, Value::Null);
    }

    /// Generates a key that sorts after every key generated before it.
    pub fn next_push_key(&mut self, now_millis: i64) -> String {
        self.sequence += 1;
        let suffix: String = rng()
            .sample_iter(&Alphanumeric)
            .take(4)
            .map(char::from)
            .collect();
        format!(
            "{:013}{:06}{}",
            now_millis.max(0),
            self.sequence % 1_000_000,
            suffix
        )
    }

    fn notify(&mut self, changed: &[&str], existed_before: bool) {
        let root = &self.root;
        self.subscribers.retain(|sub| {
            if sub.handle.is_cancelled() || sub.sender.is_closed() {
                log::trace!("Dropping subscription on [{}]", sub.path);
                return false;
            }
            let sub_segments = sub.path.segments();
            let sent = match &sub.query {
                None => {
                    if !is_prefix(&sub_segments, changed) && !is_prefix(changed, &sub_segments) {
                        return true;
                    }
                    sub.sender.send(StoreEvent::Value {
                        path: sub.path.clone(),
                        value: lookup(root, &sub_segments).cloned(),
                    })
                }
                Some(query) => {
                    let Some((key, parent)) = changed.split_last() else {
                        return true;
                    };
                    if existed_before || parent != sub_segments.as_slice() {
                        return true;
                    }
                    match lookup(root, changed) {
                        Some(value) if query.matches(value) => {
                            sub.sender.send(StoreEvent::ChildAdded {
                                path: sub.path.clone(),
                                key: (*key).to_owned(),
                                value: value.clone(),
                            })
                        }
                        _ => return true,
                    }
                }
            };
            sent.is_ok()
        });
    }
}

/// Replaces every `{".sv": "timestamp"}` placeholder with `now_millis`.
pub fn resolve_server_values(value: &mut Value, now_millis: i64) {
    let is_timestamp = value.as_object().is_some_and(|map| {
        map.len() == 1 && map.get(".sv").and_then(Value::as_str) == Some("timestamp")
    });
    if is_timestamp {
        *value = Value::from(now_millis);
        return;
    }
    match value {
        Value::Object(map) => map
            .values_mut()
            .for_each(|child| resolve_server_values(child, now_millis)),
        Value::Array(list) => list
            .iter_mut()
            .for_each(|child| resolve_server_values(child, now_millis)),
        _ => {}
    }
}

fn is_prefix(prefix: &[&str], path: &[&str]) -> bool {
    prefix.len() <= path.len() && prefix.iter().zip(path).all(|(a, b)| a == b)
}

fn lookup<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object()?.get(*segment)?;
    }
    Some(node)
}

fn write_value(root: &mut Value, segments: &[&str], value: Value) {
    if value.is_null() {
        if segments.is_empty() {
            *root = Value::Object(Map::new());
        } else {
            remove_value(root, segments);
        }
        return;
    }
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };
    let mut node = root;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        node = map
            .entry((*segment).to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        map.insert((*last).to_owned(), value);
    }
}

// Returns true when `node` ended up empty so the parent can drop it too.
fn remove_value(node: &mut Value, segments: &[&str]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    let Value::Object(map) = node else {
        return false;
    };
    if rest.is_empty() {
        map.remove(*first);
    } else if let Some(child) = map.get_mut(*first) {
        if remove_value(child, rest) {
            map.remove(*first);
        }
    }
    map.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_prune() {
        let mut tree = StoreTree::new();
        tree.set(&["status", "ledLiving"], json!("ON"));
        assert_eq!(tree.get(&["status"]), Some(&json!({ "ledLiving": "ON" })));
        tree.remove(&["status", "ledLiving"]);
        assert_eq!(tree.get(&["status"]), None);
        assert_eq!(tree.get(&[]), Some(&json!({})));
    }

    #[test]
    fn test_value_subscription_sees_nested_writes() {
        let mut tree = StoreTree::new();
        let mut sub = tree.subscribe_value(StorePath::Status);
        assert_eq!(
            sub.events.try_recv().unwrap(),
            StoreEvent::Value {
                path: StorePath::Status,
                value: None
            }
        );
        tree.set(&["status", "porton"], json!("CERRADO"));
        tree.set(&["devices", "a"], json!({ "name": "x" }));
        assert_eq!(
            sub.events.try_recv().unwrap(),
            StoreEvent::Value {
                path: StorePath::Status,
                value: Some(json!({ "porton": "CERRADO" }))
            }
        );
        assert!(sub.events.try_recv().is_err());
    }

    #[test]
    fn test_update_merges_and_removes_null_fields() {
        let mut tree = StoreTree::new();
        tree.set(&["devices", "a"], json!({ "name": "x", "i2c_address": "0x27", "pin": 3 }));
        let mut fields = Map::new();
        fields.insert("name".into(), json!("y"));
        fields.insert("i2c_address".into(), Value::Null);
        tree.update(&["devices", "a"], fields);
        assert_eq!(
            tree.get(&["devices", "a"]),
            Some(&json!({ "name": "y", "pin": 3 }))
        );
    }

    #[test]
    fn test_child_subscription_limit_and_filter() {
        let mut tree = StoreTree::new();
        for (i, kind) in ["gesture", "unknown_sighting", "gesture", "gesture"]
            .iter()
            .enumerate()
        {
            let key = format!("k{}", i);
            tree.set(&["logs", key.as_str()], json!({ "type": kind, "n": i }));
        }
        let query = ChildQuery::new()
            .order_by_child_equal_to("type", json!("gesture"))
            .limit_to_last(2);
        let mut sub = tree.subscribe_children(StorePath::Logs, query);
        let mut keys = Vec::new();
        while let Ok(StoreEvent::ChildAdded { key, .. }) = sub.events.try_recv() {
            keys.push(key);
        }
        assert_eq!(keys, vec!["k2".to_string(), "k3".to_string()]);

        tree.set(&["logs", "k4"], json!({ "type": "unknown_sighting" }));
        tree.set(&["logs", "k5"], json!({ "type": "gesture" }));
        // rewriting an existing child is not an addition
        tree.set(&["logs", "k5"], json!({ "type": "gesture", "edited": true }));
        let StoreEvent::ChildAdded { key, .. } = sub.events.try_recv().unwrap() else {
            panic!("expected child event");
        };
        assert_eq!(key, "k5");
        assert!(sub.events.try_recv().is_err());
    }

    #[test]
    fn test_cancelled_subscription_is_dropped() {
        let mut tree = StoreTree::new();
        let sub = tree.subscribe_value(StorePath::Devices);
        assert_eq!(tree.subscriber_count(), 1);
        sub.handle.cancel();
        tree.set(&["devices", "a"], json!({}));
        assert_eq!(tree.subscriber_count(), 0);
    }

    #[test]
    fn test_push_keys_are_ordered() {
        let mut tree = StoreTree::new();
        let first = tree.next_push_key(1_700_000_000_000);
        let second = tree.next_push_key(1_700_000_000_000);
        let third = tree.next_push_key(1_700_000_000_001);
        assert!(first < second && second < third);
    }

    #[test]
    fn test_resolve_server_values() {
        let mut value = json!({ "deviceKey": "a", "timestamp": { ".sv": "timestamp" } });
        resolve_server_values(&mut value, 42);
        assert_eq!(value, json!({ "deviceKey": "a", "timestamp": 42 }));
    }
}
