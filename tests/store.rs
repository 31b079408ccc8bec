#[cfg(test)]
mod tests {
    use hc_gesture_dashboard::*;
    use serde_json::{json, Map};

    fn log(kind: &str, action: &str) -> serde_json::Value {
        json!({ "timestamp": "2024-05-01 10:00:00", "user": "Ana", "action": action, "type": kind })
    }

    #[tokio::test]
    async fn test_children_query_filters_and_limits() {
        let store = MemoryStore::new();
        for i in 0..4 {
            store.external_push(&StorePath::Logs, log("gesture", &format!("g{}", i)));
            store.external_push(&StorePath::Logs, log("unknown_sighting", &format!("u{}", i)));
        }
        let query = ChildQuery::new()
            .order_by_child_equal_to("type", json!("gesture"))
            .limit_to_last(2);
        let mut sub = store
            .subscribe_children(StorePath::Logs, query)
            .await
            .unwrap();

        let mut actions = Vec::new();
        for _ in 0..2 {
            match sub.events.recv().await {
                Some(StoreEvent::ChildAdded { value, .. }) => {
                    actions.push(value["action"].as_str().unwrap().to_string())
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(actions, vec!["g2", "g3"]);
        assert!(sub.events.try_recv().is_err());

        store.external_push(&StorePath::Logs, log("unknown_sighting", "u9"));
        assert!(sub.events.try_recv().is_err());
        let key = store.external_push(&StorePath::Logs, log("gesture", "g9"));
        match sub.events.try_recv() {
            Ok(StoreEvent::ChildAdded { key: added, value, .. }) => {
                assert_eq!(added, key);
                assert_eq!(value["action"], json!("g9"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_value_subscription_sees_full_collection() {
        let store = MemoryStore::with_data(json!({ "devices": { "d1": { "name": "Luz" } } }));
        let mut sub = store.subscribe_value(StorePath::Devices).await.unwrap();
        assert_eq!(
            sub.events.recv().await,
            Some(StoreEvent::Value {
                path: StorePath::Devices,
                value: Some(json!({ "d1": { "name": "Luz" } }))
            })
        );

        let mut fields = Map::new();
        fields.insert("pin".to_string(), json!(5));
        store
            .update(StorePath::Device("d1".to_string()), fields)
            .await
            .unwrap();
        assert_eq!(
            sub.events.recv().await,
            Some(StoreEvent::Value {
                path: StorePath::Devices,
                value: Some(json!({ "d1": { "name": "Luz", "pin": 5 } }))
            })
        );

        store
            .remove(StorePath::Device("d1".to_string()))
            .await
            .unwrap();
        assert_eq!(
            sub.events.recv().await,
            Some(StoreEvent::Value {
                path: StorePath::Devices,
                value: None
            })
        );
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_subscription_stops() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe_value(StorePath::Status).await.unwrap();
        let _initial = sub.events.recv().await;
        sub.handle.cancel();
        assert!(sub.handle.is_cancelled());
        store.external_set(&StorePath::StatusEntry("a".to_string()), json!("ON"));
        assert_eq!(sub.events.recv().await, None);
    }

    #[tokio::test]
    async fn test_cancel_ends_pending_recv() {
        let store = MemoryStore::new();
        let mut sub = store
            .subscribe_children(StorePath::Logs, ChildQuery::new().limit_to_last(10))
            .await
            .unwrap();
        let handle = sub.handle.clone();
        let waiter = tokio::task::spawn(async move { sub.recv().await });
        tokio::task::yield_now().await;

        // no write reaches the store after cancelling
        handle.cancel();
        let received = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("recv did not return after cancel")
            .unwrap();
        assert_eq!(received, None);
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            StorePath::parse("status/porton").unwrap(),
            StorePath::StatusEntry("porton".to_string())
        );
        assert_eq!(StorePath::Logs.to_string(), "logs");
        assert!(StorePath::Commands.is_append_only());
        assert!(StorePath::Device(String::new()).validate().is_err());
    }
}
