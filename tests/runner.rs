#[cfg(test)]
mod tests {
    use hc_gesture_dashboard::*;
    use serde_json::json;
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };
    use tokio::sync::watch;

    #[derive(Clone, Default)]
    struct QuietPrompt {
        alerts: Arc<Mutex<Vec<String>>>,
    }

    impl UserPrompt for QuietPrompt {
        fn alert(&self, message: &str) {
            self.alerts.lock().unwrap().push(message.to_string());
        }

        fn confirm(&self, _message: &str) -> bool {
            true
        }
    }

    async fn wait_for(
        views: &mut watch::Receiver<DashboardView>,
        condition: impl FnMut(&DashboardView) -> bool,
    ) {
        tokio::time::timeout(Duration::from_secs(5), views.wait_for(condition))
            .await
            .expect("view did not update in time")
            .expect("dashboard stopped");
    }

    async fn wait_for_writes(store: &MemoryStore, count: usize) {
        for _ in 0..100 {
            if store.write_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} writes, saw {}", count, store.write_count());
    }

    fn store() -> MemoryStore {
        MemoryStore::with_data(json!({
            "devices": {
                "d1": { "name": "Living", "state_key": "ledLiving", "type": "led", "pin": 13 }
            },
            "status": { "isAuthorized": true, "currentUser": "Ana" },
            "available_pins": { "D13": 13 },
            "logs": {
                "a": { "timestamp": "2024-05-01 09:00:00", "user": "Ana", "action": "Cinco", "type": "gesture" }
            }
        }))
    }

    #[tokio::test]
    async fn test_dashboard_follows_store() {
        let store = store();
        let handle = run_dashboard(store.clone(), QuietPrompt::default(), &DashboardConfig::default())
            .await
            .unwrap();
        let mut views = handle.views();

        wait_for(&mut views, |view| {
            view.cards.len() == 1 && view.log_panels[0].items[0].key.as_deref() == Some("a")
        })
        .await;
        let view = handle.current_view();
        assert_eq!(view.cards[0].style, CardStyle::Off);
        assert_eq!(view.banner.text, "Autorizado: Ana (gestos activos)");

        // the actuator confirms a change
        store.external_set(&StorePath::StatusEntry("ledLiving".to_string()), json!("ON"));
        wait_for(&mut views, |view| view.cards[0].style == CardStyle::On).await;

        store.external_push(
            &StorePath::Logs,
            json!({ "timestamp": "2024-05-01 09:01:00", "user": "", "action": "Rostro", "type": "unknown_sighting" }),
        );
        wait_for(&mut views, |view| view.log_panels[0].items.len() == 2).await;
        assert_eq!(
            handle.current_view().log_panels[0].items[0].text,
            "[2024-05-01 09:01:00] Rostro"
        );

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_intents_write_to_store() {
        let store = store();
        let prompt = QuietPrompt::default();
        let handle = run_dashboard(store.clone(), prompt.clone(), &DashboardConfig::default())
            .await
            .unwrap();
        let mut views = handle.views();
        wait_for(&mut views, |view| view.cards.len() == 1).await;

        handle.send(UserIntent::ClickCard("d1".to_string())).unwrap();
        wait_for_writes(&store, 1).await;
        let commands = store.children(&StorePath::Commands);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].1["deviceKey"], json!("ledLiving"));

        handle.send(UserIntent::OpenCreate).unwrap();
        handle.send(UserIntent::Save).unwrap();
        wait_for(&mut views, |view| view.editor.is_some()).await;
        handle
            .send(UserIntent::Input(FormInput::Name("Cocina".to_string())))
            .unwrap();
        handle
            .send(UserIntent::Input(FormInput::StateKey("ledCocina".to_string())))
            .unwrap();
        handle.send(UserIntent::Save).unwrap();
        wait_for(&mut views, |view| view.cards.len() == 2).await;
        assert_eq!(prompt.alerts.lock().unwrap().len(), 1);
        assert!(handle.current_view().editor.is_none());

        handle.send(UserIntent::ClickEdit("d1".to_string())).unwrap();
        handle.send(UserIntent::Delete).unwrap();
        wait_for(&mut views, |view| view.cards.len() == 1).await;
        assert_eq!(
            store.snapshot(&StorePath::StatusEntry("ledLiving".to_string())),
            None
        );
        assert_eq!(handle.current_view().cards[0].state_key, "ledCocina");

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropping_handle_ends_loop() {
        let store = store();
        let config = DashboardConfig {
            idle_timeout: 1,
            ..Default::default()
        };
        let handle = run_dashboard(store.clone(), QuietPrompt::default(), &config)
            .await
            .unwrap();
        let mut views = handle.views();
        wait_for(&mut views, |view| view.cards.len() == 1).await;

        drop(handle);
        // the loop owns the view sender, it is gone once the loop ends
        let ended = tokio::time::timeout(Duration::from_secs(2), async {
            while views.changed().await.is_ok() {}
        })
        .await;
        assert!(ended.is_ok());
    }
}
