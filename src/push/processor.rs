use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{PAYLOAD_FIELD, PushError, PushKeyManager, PushPayload};
use crate::backend::SecretKey;
use crate::envelope;
use crate::notify::{NotificationAggregator, NotificationId, NotificationSurface, SurfaceError};

/// What one push event changed in the tray.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub dismissed: Vec<NotificationId>,
    pub shown: Vec<NotificationId>,
}

impl PushReport {
    fn failed(&self, step: &'static str, room_id: &str, source: SurfaceError) -> PushError {
        PushError::Tray {
            step,
            room_id: room_id.to_string(),
            applied: self.dismissed.len() + self.shown.len(),
            source,
        }
    }
}

/// Decrypt, validate and display inbound pushes.
///
/// The aggregator sits behind a mutex: the tray must never be mutated by two
/// pushes at once.
pub struct PushProcessor<S> {
    keys: Arc<PushKeyManager>,
    aggregator: Arc<Mutex<NotificationAggregator<S>>>,
}

impl<S> Clone for PushProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            aggregator: self.aggregator.clone(),
        }
    }
}

impl<S: NotificationSurface + 'static> PushProcessor<S> {
    pub fn new(keys: Arc<PushKeyManager>, aggregator: NotificationAggregator<S>) -> Self {
        Self {
            keys,
            aggregator: Arc::new(Mutex::new(aggregator)),
        }
    }

    pub fn aggregator(&self) -> &Arc<Mutex<NotificationAggregator<S>>> {
        &self.aggregator
    }

    /// Run one push to completion. Blocking.
    pub fn process(&self, data: &HashMap<String, String>) -> Result<PushReport, PushError> {
        let encoded = data.get(PAYLOAD_FIELD).ok_or(PushError::MissingPayload)?;
        let raw = self.keys.get_existing().ok_or(PushError::NoKey)?;
        let key = SecretKey::exportable(&raw);

        let text = envelope::decrypt_str(&key, encoded)?;
        let payload = PushPayload::parse(&text)?;
        tracing::debug!(
            dismiss = payload.dismissals().len(),
            messages = payload.messages().len(),
            "Push payload decoded"
        );

        let mut aggregator = self
            .aggregator
            .lock()
            .map_err(|_| PushError::Worker("aggregator mutex poisoned".into()))?;
        let mut report = PushReport::default();
        for dismiss in payload.dismissals() {
            let id = aggregator
                .dismiss(&dismiss.room_id)
                .map_err(|e| report.failed("dismiss", &dismiss.room_id, e))?;
            report.dismissed.push(id);
        }
        for message in payload.messages() {
            let id = aggregator
                .show(message)
                .map_err(|e| report.failed("show", &message.room_id, e))?;
            report.shown.push(id);
        }
        Ok(report)
    }

    /// [`process`](Self::process) on the blocking pool.
    pub async fn run(&self, data: HashMap<String, String>) -> Result<PushReport, PushError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.process(&data))
            .await
            .map_err(|e| PushError::Worker(e.to_string()))?
    }

    /// Like [`run`](Self::run), but every failure is logged and dropped;
    /// a push delivered by the transport has no caller to report to.
    pub async fn handle(&self, data: HashMap<String, String>) -> Option<PushReport> {
        match self.run(data).await {
            Ok(report) => {
                tracing::info!(
                    dismissed = report.dismissed.len(),
                    shown = report.shown.len(),
                    "Push processed"
                );
                Some(report)
            }
            Err(PushError::NoKey) => {
                tracing::warn!("Dropping push: no push key, re-registration required");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping push");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{KeyRef, SoftwareBackend};
    use crate::notify::{ChannelConfig, MemorySurface};
    use crate::store::Preferences;

    fn processor(dir: &std::path::Path) -> PushProcessor<MemorySurface> {
        let prefs = Arc::new(Mutex::new(Preferences::open(dir.join("prefs.json")).unwrap()));
        let key = Arc::new(KeyRef::new(Arc::new(SoftwareBackend::new()), "credentials"));
        let keys = Arc::new(PushKeyManager::new(prefs, key));
        let aggregator = NotificationAggregator::new(MemorySurface::new(), ChannelConfig::default());
        PushProcessor::new(keys, aggregator)
    }

    #[test]
    fn test_missing_payload_field() {
        let dir = tempfile::tempdir().unwrap();
        let res = processor(dir.path()).process(&HashMap::new());
        assert!(matches!(res, Err(PushError::MissingPayload)));
    }

    #[test]
    fn test_no_key_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let data = HashMap::from([(PAYLOAD_FIELD.to_string(), "AAAA".to_string())]);
        let res = processor(dir.path()).process(&data);
        assert!(matches!(res, Err(PushError::NoKey)));
    }

    #[test]
    fn test_garbage_payload_is_authentication_failure() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(dir.path());
        p.keys.get_or_create().unwrap();
        let data = HashMap::from([(PAYLOAD_FIELD.to_string(), "bm90IGFuIGVudmVsb3Bl".to_string())]);
        let res = p.process(&data);
        assert!(matches!(
            res,
            Err(PushError::Decrypt(crate::envelope::EnvelopeError::AuthenticationFailure))
        ));
        assert!(p.aggregator().lock().unwrap().surface().is_empty());
    }

    #[test]
    fn test_schema_mismatch_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(dir.path());
        let raw = p.keys.get_or_create().unwrap();
        let payload = envelope::encrypt_str(&SecretKey::exportable(&raw), r#"{"messages":[{}]}"#).unwrap();
        let data = HashMap::from([(PAYLOAD_FIELD.to_string(), payload)]);
        assert!(matches!(p.process(&data), Err(PushError::Schema(_))));
    }
}
