use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use chrono::Utc;
use rand::{distr::Alphanumeric, rng, RngExt};
use rumqttc::{AsyncClient, ConnectionError, MqttOptions, QoS};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::{
    mpsc::{self, Receiver},
    watch,
};

use super::{
    resolve_server_values, ChildQuery, RemoteStore, StoreError, StorePath, StoreTree,
    Subscription, COMMANDS,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttStoreConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id: Option<String>,
    /// Every store path lives below this topic.
    pub topic_prefix: String,
    pub mqtt_channel_size: usize,
    pub keep_alive: u64,
    pub max_packet_size_incoming: usize,
    pub max_packet_size_outgoing: usize,
    pub clean_session: bool,
}

impl Default for MqttStoreConfig {
    fn default() -> Self {
        Self::new("localhost")
    }
}

impl MqttStoreConfig {
    /// Broker at `hostname` with the default port, prefix and limits.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: None,
            topic_prefix: "home".to_owned(),
            mqtt_channel_size: 1024,
            keep_alive: 5,
            max_packet_size_incoming: 512 * 1024,
            max_packet_size_outgoing: 512 * 1024,
            clean_session: true,
        }
    }

    pub fn to_mqtt_options(&self) -> MqttOptions {
        let client_id = self.client_id.clone().unwrap_or_else(|| {
            let suffix: String = rng()
                .sample_iter(&Alphanumeric)
                .take(12)
                .map(char::from)
                .collect();
            format!("dash-{}", suffix)
        });
        if client_id.len() > 23 {
            log::warn!("Client id [{}] is longer than 23 characters, brokers may reject it", client_id);
        }
        let mut mqttoptions = MqttOptions::new(client_id, self.hostname.to_owned(), self.port);
        if !self.username.is_empty() && !self.password.is_empty() {
            mqttoptions.set_credentials(self.username.to_owned(), self.password.to_owned());
        }
        mqttoptions.set_keep_alive(Duration::from_secs(self.keep_alive));
        mqttoptions.set_clean_session(self.clean_session);
        mqttoptions
            .set_max_packet_size(self.max_packet_size_incoming, self.max_packet_size_outgoing);
        mqttoptions
    }
}

#[derive(Debug)]
pub enum MqttStoreEvent {
    Connect,
    Disconnect,
    Stop,
    Error(ConnectionError),
}

pub struct MqttStoreHandle {
    stop_sender: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<Result<(), StoreError>>,
}

impl MqttStoreHandle {
    /// Stops the event loop task.
    pub async fn stop(self) -> Result<(), StoreError> {
        let _ = self.stop_sender.send(true);
        self.handle.await??;
        Ok(())
    }
}

/// One mqtt message a store write turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Publication {
    topic: String,
    payload: Vec<u8>,
    retain: bool,
}

/// Remote store mirrored over an MQTT broker.
///
/// Each record is a retained json payload at `<prefix>/<collection>/<key>`,
/// the catalogs sit directly at `<prefix>/<collection>`. An empty retained
/// payload deletes a record. Commands are published without retain since the
/// actuator consumes them once. Incoming publishes update the local
/// [`StoreTree`], which drives all subscriptions.
#[derive(Debug, Clone)]
pub struct MqttStore {
    client: AsyncClient,
    topic_prefix: String,
    tree: Arc<Mutex<StoreTree>>,
    writes: Arc<AtomicUsize>,
}

impl MqttStore {
    fn lock(&self) -> MutexGuard<'_, StoreTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn topic(&self, segments: &[&str]) -> String {
        let mut topic = self.topic_prefix.clone();
        for segment in segments {
            topic.push('/');
            topic.push_str(segment);
        }
        topic
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Retained json for records, an empty retained payload for deletions,
    /// commands go out without retain.
    fn publication(
        &self,
        segments: &[&str],
        value: Option<&Value>,
    ) -> Result<Publication, StoreError> {
        let payload = match value {
            Some(value) => serde_json::to_vec(value)?,
            None => Vec::new(),
        };
        Ok(Publication {
            topic: self.topic(segments),
            payload,
            retain: segments.first() != Some(&COMMANDS),
        })
    }

    async fn publish(&self, publications: Vec<Publication>) -> Result<(), StoreError> {
        for publication in publications {
            log::trace!(
                "publish [{}] ({} bytes)",
                publication.topic,
                publication.payload.len()
            );
            self.client
                .publish(
                    publication.topic,
                    QoS::AtLeastOnce,
                    publication.retain,
                    publication.payload,
                )
                .await?;
        }
        Ok(())
    }

    /// Topics (as store segments) and payloads a write to `path` maps to.
    /// Writes to a record collection root fan out to its children.
    fn record_writes(&self, path: &StorePath, value: Option<Value>) -> Vec<(Vec<String>, Option<Value>)> {
        let segments: Vec<String> = path.segments().into_iter().map(str::to_owned).collect();
        let fans_out = matches!(path, StorePath::Status | StorePath::Devices);
        if !fans_out {
            return vec![(segments, value)];
        }
        let mut writes = Vec::new();
        // children that disappear get an empty payload
        if let Some(Value::Object(current)) = self.lock().get(&path.segments()) {
            for key in current.keys() {
                let still_there = matches!(&value, Some(Value::Object(map)) if map.contains_key(key));
                if !still_there {
                    writes.push((child_segments(&segments, key), None));
                }
            }
        }
        if let Some(Value::Object(map)) = value {
            for (key, child) in map {
                writes.push((child_segments(&segments, &key), Some(child)));
            }
        }
        writes
    }

    fn publications(
        &self,
        writes: Vec<(Vec<String>, Option<Value>)>,
    ) -> Result<Vec<Publication>, StoreError> {
        writes
            .iter()
            .map(|(segments, value)| {
                let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
                self.publication(&segments, value.as_ref())
            })
            .collect()
    }

    fn set_plan(&self, path: &StorePath, mut value: Value) -> Result<Vec<Publication>, StoreError> {
        resolve_server_values(&mut value, Utc::now().timestamp_millis());
        let value = if value.is_null() { None } else { Some(value) };
        self.publications(self.record_writes(path, value))
    }

    /// Shallow merge into the current record; `null` fields are dropped.
    fn update_plan(
        &self,
        path: &StorePath,
        fields: Map<String, Value>,
    ) -> Result<Vec<Publication>, StoreError> {
        let now = Utc::now().timestamp_millis();
        let mut merged = match self.lock().get(&path.segments()) {
            Some(Value::Object(current)) => current.clone(),
            _ => Map::new(),
        };
        for (field, mut value) in fields {
            if value.is_null() {
                merged.remove(&field);
            } else {
                resolve_server_values(&mut value, now);
                merged.insert(field, value);
            }
        }
        self.publications(self.record_writes(path, Some(Value::Object(merged))))
    }

    fn push_plan(&self, path: &StorePath, mut value: Value) -> Result<(String, Publication), StoreError> {
        if path.key().is_some() {
            return Err(StoreError::NotACollection(path.clone()));
        }
        let now = Utc::now().timestamp_millis();
        resolve_server_values(&mut value, now);
        let key = self.lock().next_push_key(now);
        let publication = self.publication(&[path.collection(), key.as_str()], Some(&value))?;
        Ok((key, publication))
    }

    fn handle_publish(&self, topic: &str, payload: &[u8]) {
        let Some(path) = topic
            .strip_prefix(self.topic_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return;
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        // commands are write-only for the dashboard
        if segments.is_empty() || segments[0] == COMMANDS {
            return;
        }
        if payload.is_empty() {
            self.lock().remove(&segments);
            return;
        }
        let value = serde_json::from_slice(payload)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()));
        self.lock().set(&segments, value);
    }
}

fn child_segments(parent: &[String], key: &str) -> Vec<String> {
    let mut segments = parent.to_vec();
    segments.push(key.to_owned());
    segments
}

impl RemoteStore for MqttStore {
    async fn subscribe_value(&self, path: StorePath) -> Result<Subscription, StoreError> {
        path.validate()?;
        Ok(self.lock().subscribe_value(path))
    }

    async fn subscribe_children(
        &self,
        path: StorePath,
        query: ChildQuery,
    ) -> Result<Subscription, StoreError> {
        path.validate()?;
        Ok(self.lock().subscribe_children(path, query))
    }

    async fn set(&self, path: StorePath, value: Value) -> Result<(), StoreError> {
        path.validate()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let publications = self.set_plan(&path, value)?;
        self.publish(publications).await
    }

    async fn update(&self, path: StorePath, fields: Map<String, Value>) -> Result<(), StoreError> {
        path.validate()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let publications = self.update_plan(&path, fields)?;
        self.publish(publications).await
    }

    async fn remove(&self, path: StorePath) -> Result<(), StoreError> {
        path.validate()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let publications = self.set_plan(&path, Value::Null)?;
        self.publish(publications).await
    }

    async fn push(&self, path: StorePath, value: Value) -> Result<String, StoreError> {
        path.validate()?;
        let (key, publication) = self.push_plan(&path, value)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.publish(vec![publication]).await?;
        Ok(key)
    }
}

/// Connects to the broker and starts mirroring `<prefix>/#`.
///
/// Returns the handle to stop the event loop, the store and a channel with
/// connection state changes. Connection errors are reported on that channel
/// and retried every 5 seconds; subscriptions simply stop receiving updates
/// while the broker is unreachable.
pub fn run_mqtt_store(
    config: &MqttStoreConfig,
) -> Result<(MqttStoreHandle, MqttStore, Receiver<MqttStoreEvent>), StoreError> {
    let mqttoptions = config.to_mqtt_options();
    log::trace!("Connecting to mqtt: {}", mqttoptions.client_id());
    let (sender, receiver) = mpsc::channel(config.mqtt_channel_size);
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, config.mqtt_channel_size);
    let (stop_sender, mut stop_receiver) = watch::channel(false);

    let store = MqttStore {
        client: client.clone(),
        topic_prefix: config.topic_prefix.trim_end_matches('/').to_owned(),
        tree: Arc::new(Mutex::new(StoreTree::new())),
        writes: Arc::new(AtomicUsize::new(0)),
    };
    let mirror = store.clone();
    let subscription = format!("{}/#", store.topic_prefix);

    let handle = tokio::task::spawn(async move {
        let mut connected = false;
        loop {
            let poll_res = tokio::select! {
                poll_res = eventloop.poll() => poll_res,
                _exit = stop_receiver.changed() => {
                    if *stop_receiver.borrow() {
                        log::trace!("Received stop signal. Exiting...");
                        break;
                    }
                    continue;
                }
            };

            match poll_res {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(p))) => {
                    mirror.handle_publish(&p.topic, &p.payload);
                }
                Ok(rumqttc::Event::Incoming(rumqttc::Incoming::ConnAck(_))) => {
                    log::trace!("STORE: Connected");
                    connected = true;
                    // retained records arrive right after subscribing
                    client.try_subscribe(subscription.as_str(), QoS::AtLeastOnce)?;
                    sender
                        .send(MqttStoreEvent::Connect)
                        .await
                        .map_err(|_| StoreError::ChannelClosed)?;
                }
                Ok(rumqttc::Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                    log::trace!("STORE: Connection closed from our side.");
                    sender
                        .send(MqttStoreEvent::Disconnect)
                        .await
                        .map_err(|_| StoreError::ChannelClosed)?;
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    if connected {
                        connected = false;
                        sender
                            .send(MqttStoreEvent::Disconnect)
                            .await
                            .map_err(|_| StoreError::ChannelClosed)?;
                    }
                    log::error!("MqttStore: Error connecting mqtt. {:#?}", err);
                    sender
                        .send(MqttStoreEvent::Error(err))
                        .await
                        .map_err(|_| StoreError::ChannelClosed)?;
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
        sender
            .send(MqttStoreEvent::Stop)
            .await
            .map_err(|_| StoreError::ChannelClosed)?;
        log::trace!("Exiting store eventloop...");
        Ok(())
    });

    Ok((
        MqttStoreHandle {
            stop_sender,
            handle,
        },
        store,
        receiver,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreEvent;
    use serde_json::json;

    fn offline_store() -> MqttStore {
        let (client, _eventloop) =
            AsyncClient::new(MqttStoreConfig::new("localhost").to_mqtt_options(), 10);
        MqttStore {
            client,
            topic_prefix: "casa".to_owned(),
            tree: Arc::new(Mutex::new(StoreTree::new())),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[tokio::test]
    async fn test_incoming_publishes_feed_the_tree() {
        let store = offline_store();
        let mut sub = store.subscribe_value(StorePath::Status).await.unwrap();
        let _initial = sub.events.recv().await;

        store.handle_publish("casa/status/ledLiving", b"\"ON\"");
        store.handle_publish("casa/status/porton", b"ABIERTO");
        store.handle_publish("casa/commands/abc", b"{\"deviceKey\":\"x\"}");
        store.handle_publish("otro/status/x", b"\"ON\"");

        let _first = sub.events.recv().await;
        assert_eq!(
            sub.events.recv().await,
            Some(StoreEvent::Value {
                path: StorePath::Status,
                value: Some(json!({ "ledLiving": "ON", "porton": "ABIERTO" }))
            })
        );
        assert_eq!(store.lock().get(&["commands"]), None);

        store.handle_publish("casa/status/porton", b"");
        assert_eq!(
            store.lock().get(&["status"]),
            Some(&json!({ "ledLiving": "ON" }))
        );
    }

    #[test]
    fn test_collection_writes_fan_out() {
        let store = offline_store();
        store.handle_publish("casa/devices/a", b"{\"name\":\"A\"}");
        store.handle_publish("casa/devices/b", b"{\"name\":\"B\"}");
        let writes = store.record_writes(
            &StorePath::Devices,
            Some(json!({ "b": { "name": "B2" }, "c": { "name": "C" } })),
        );
        assert_eq!(
            writes,
            vec![
                (vec!["devices".to_string(), "a".to_string()], None),
                (
                    vec!["devices".to_string(), "b".to_string()],
                    Some(json!({ "name": "B2" }))
                ),
                (
                    vec!["devices".to_string(), "c".to_string()],
                    Some(json!({ "name": "C" }))
                ),
            ]
        );
        let single = store.record_writes(&StorePath::StatusEntry("x".into()), None);
        assert_eq!(single, vec![(vec!["status".to_string(), "x".to_string()], None)]);
    }

    #[test]
    fn test_write_publications() {
        let store = offline_store();
        store.handle_publish("casa/devices/a", b"{\"name\":\"A\",\"i2c_address\":\"0x27\"}");

        let set = store
            .set_plan(&StorePath::StatusEntry("porton".into()), json!("CERRADO"))
            .unwrap();
        assert_eq!(
            set,
            vec![Publication {
                topic: "casa/status/porton".to_string(),
                payload: b"\"CERRADO\"".to_vec(),
                retain: true,
            }]
        );

        let removed = store
            .set_plan(&StorePath::Device("a".into()), Value::Null)
            .unwrap();
        assert_eq!(
            removed,
            vec![Publication {
                topic: "casa/devices/a".to_string(),
                payload: Vec::new(),
                retain: true,
            }]
        );

        let mut fields = Map::new();
        fields.insert("pin".to_string(), json!(5));
        fields.insert("i2c_address".to_string(), Value::Null);
        let updated = store
            .update_plan(&StorePath::Device("a".into()), fields)
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert!(updated[0].retain);
        let record: Value = serde_json::from_slice(&updated[0].payload).unwrap();
        assert_eq!(record, json!({ "name": "A", "pin": 5 }));

        let (key, command) = store
            .push_plan(
                &StorePath::Commands,
                json!({ "deviceKey": "porton", "timestamp": { ".sv": "timestamp" } }),
            )
            .unwrap();
        assert_eq!(command.topic, format!("casa/commands/{}", key));
        assert!(!command.retain);
        let command: Value = serde_json::from_slice(&command.payload).unwrap();
        assert!(command["timestamp"].is_i64());

        let (_, log) = store
            .push_plan(&StorePath::Logs, json!({ "action": "Cinco" }))
            .unwrap();
        assert!(log.retain);
        assert!(matches!(
            store.push_plan(&StorePath::Device("a".into()), json!({})),
            Err(StoreError::NotACollection(_))
        ));
    }

    #[test]
    fn test_config_from_yaml() {
        let config: MqttStoreConfig = serde_yml::from_str(
            r#"
hostname: broker.local
port: 1884
topic_prefix: casa
"#,
        )
        .unwrap();
        assert_eq!(config.hostname, "broker.local");
        assert_eq!(config.port, 1884);
        assert_eq!(config.keep_alive, 5);
        assert!(config.clean_session);
    }
}
