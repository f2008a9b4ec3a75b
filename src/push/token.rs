use tokio::sync::watch;

use crate::error::Result;
use crate::store::{self, SharedPreferences, keys};

/// Latest push token, persisted and broadcast.
///
/// Publications overwrite rather than queue: a session that connects late only
/// ever sees the newest token.
pub struct TokenPublisher {
    prefs: SharedPreferences,
    tx: watch::Sender<Option<String>>,
}

impl TokenPublisher {
    /// Seed the channel with the token already stored, if any.
    pub fn load(prefs: SharedPreferences) -> Result<Self> {
        let initial = store::lock(&prefs)?
            .get(keys::PUSH_TOKEN)
            .map(str::to_string);
        let (tx, _) = watch::channel(initial);
        Ok(Self { prefs, tx })
    }

    /// Persist `token` and wake every subscribed session. Blocking.
    pub fn publish(&self, token: &str) -> Result<()> {
        store::lock(&self.prefs)?.set(keys::PUSH_TOKEN, token)?;
        self.tx.send_replace(Some(token.to_string()));
        tracing::info!("Push token updated");
        Ok(())
    }

    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::store::Preferences;

    #[test]
    fn test_publish_persists_and_broadcasts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let prefs = Arc::new(Mutex::new(Preferences::open(path.clone()).unwrap()));

        let publisher = TokenPublisher::load(prefs).unwrap();
        let mut rx = publisher.subscribe();
        assert!(rx.borrow_and_update().is_none());

        publisher.publish("tok-1").unwrap();
        publisher.publish("tok-2").unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_deref(), Some("tok-2"));

        let reopened = Arc::new(Mutex::new(Preferences::open(path).unwrap()));
        let publisher = TokenPublisher::load(reopened).unwrap();
        assert_eq!(publisher.current().as_deref(), Some("tok-2"));
    }
}
