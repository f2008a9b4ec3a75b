use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{Conversation, Notification, NotificationId};

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt tray: {0}")]
    Corrupt(String),
    #[error("Surface closed")]
    Closed,
}

/// Platform notification tray. Not safe for concurrent mutation; callers
/// serialize access (see [`super::NotificationAggregator`]).
pub trait NotificationSurface: Send {
    /// Conversation currently displayed under `id`, if any.
    fn active(&self, id: NotificationId) -> Result<Option<Conversation>, SurfaceError>;
    /// Post or replace the notification under `notification.id`.
    fn notify(&mut self, notification: Notification) -> Result<(), SurfaceError>;
    /// Returns whether anything was displayed under `id`.
    fn cancel(&mut self, id: NotificationId) -> Result<bool, SurfaceError>;
}

/// In-process tray.
#[derive(Debug, Default)]
pub struct MemorySurface {
    shown: BTreeMap<NotificationId, Notification>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.shown.get(&id)
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }
}

impl NotificationSurface for MemorySurface {
    fn active(&self, id: NotificationId) -> Result<Option<Conversation>, SurfaceError> {
        Ok(self.shown.get(&id).map(|n| n.conversation.clone()))
    }

    fn notify(&mut self, notification: Notification) -> Result<(), SurfaceError> {
        self.shown.insert(notification.id, notification);
        Ok(())
    }

    fn cancel(&mut self, id: NotificationId) -> Result<bool, SurfaceError> {
        Ok(self.shown.remove(&id).is_some())
    }
}

/// Tray persisted as JSON so conversations keep growing across process
/// restarts. Every operation holds an exclusive `fd-lock` on `<path>.lock`.
#[derive(Debug)]
pub struct TrayFile {
    path: PathBuf,
    lock_path: PathBuf,
}

type Tray = BTreeMap<NotificationId, Notification>;

impl TrayFile {
    pub fn new(path: PathBuf) -> Self {
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_path),
        }
    }

    fn with_tray<T>(
        &self,
        f: impl FnOnce(&mut Tray) -> Result<(T, bool), SurfaceError>,
    ) -> Result<T, SurfaceError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        let mut lock = fd_lock::RwLock::new(lock_file);
        let _guard = lock.write()?;

        let mut tray = self.read()?;
        let (out, dirty) = f(&mut tray)?;
        if dirty {
            self.write(&tray)?;
        }
        Ok(out)
    }

    fn read(&self) -> Result<Tray, SurfaceError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => {
                let list: Vec<Notification> = serde_json::from_slice(&bytes)
                    .map_err(|e| SurfaceError::Corrupt(e.to_string()))?;
                Ok(list.into_iter().map(|n| (n.id, n)).collect())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Tray::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, tray: &Tray) -> Result<(), SurfaceError> {
        let list: Vec<&Notification> = tray.values().collect();
        let bytes =
            serde_json::to_vec(&list).map_err(|e| SurfaceError::Corrupt(e.to_string()))?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&self.path).map_err(|e| SurfaceError::Io(e.error))?;
        Ok(())
    }
}

impl NotificationSurface for TrayFile {
    fn active(&self, id: NotificationId) -> Result<Option<Conversation>, SurfaceError> {
        self.with_tray(|tray| Ok((tray.get(&id).map(|n| n.conversation.clone()), false)))
    }

    fn notify(&mut self, notification: Notification) -> Result<(), SurfaceError> {
        self.with_tray(|tray| {
            tray.insert(notification.id, notification);
            Ok(((), true))
        })
    }

    fn cancel(&mut self, id: NotificationId) -> Result<bool, SurfaceError> {
        self.with_tray(|tray| {
            let removed = tray.remove(&id).is_some();
            Ok((removed, removed))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Person;

    fn notification(room: &str, text: &str) -> Notification {
        let user = Person {
            key: "@me:example.org".into(),
            name: "Me".into(),
            uri: "matrix:u/me:example.org".into(),
        };
        let mut conversation = Conversation::new(user.clone());
        conversation.messages.push(crate::notify::ConversationMessage {
            text: text.into(),
            timestamp: 1,
            sender: user,
        });
        Notification {
            id: NotificationId::for_room(room),
            channel_id: "silent_notification".into(),
            when: 1,
            target_uri: "matrix:roomid/r/e/e".into(),
            auto_cancel: true,
            conversation,
        }
    }

    #[test]
    fn test_tray_file_persists_between_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tray.json");
        let id = NotificationId::for_room("!a:example.org");

        let mut tray = TrayFile::new(path.clone());
        tray.notify(notification("!a:example.org", "first")).unwrap();

        let tray2 = TrayFile::new(path);
        let conv = tray2.active(id).unwrap().expect("conversation persisted");
        assert_eq!(conv.messages[0].text, "first");
    }

    #[test]
    fn test_tray_file_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let mut tray = TrayFile::new(dir.path().join("tray.json"));
        let id = NotificationId::for_room("!a:example.org");
        tray.notify(notification("!a:example.org", "x")).unwrap();
        assert!(tray.cancel(id).unwrap());
        assert!(!tray.cancel(id).unwrap());
        assert!(tray.active(id).unwrap().is_none());
    }

    #[test]
    fn test_tray_file_corrupt_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tray.json");
        std::fs::write(&path, b"garbage").unwrap();
        let tray = TrayFile::new(path);
        let res = tray.active(NotificationId::for_room("!a:example.org"));
        assert!(matches!(res, Err(SurfaceError::Corrupt(_))));
    }
}
