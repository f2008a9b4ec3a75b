use super::{
    ChannelConfig, Conversation, ConversationMessage, Notification, NotificationId,
    NotificationSurface, Person, SurfaceError, strip_sigil,
};
use crate::push::payload::{PushMessage, PushUser};

/// Merges push messages into one conversation notification per room.
/// Conversations only grow until dismissed.
pub struct NotificationAggregator<S> {
    surface: S,
    channels: ChannelConfig,
}

impl<S: NotificationSurface> NotificationAggregator<S> {
    pub fn new(surface: S, channels: ChannelConfig) -> Self {
        Self { surface, channels }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn show(&mut self, msg: &PushMessage) -> Result<NotificationId, SurfaceError> {
        let id = NotificationId::for_room(&msg.room_id);
        let mut conversation = match self.surface.active(id)? {
            Some(existing) => existing,
            None => Conversation::new(person(&msg.self_user)),
        };

        conversation.title = (msg.room_name != msg.sender.name).then(|| msg.room_name.clone());
        conversation.messages.push(ConversationMessage {
            text: msg.text.clone(),
            timestamp: msg.timestamp,
            sender: person(&msg.sender),
        });

        let notification = Notification {
            id,
            channel_id: self.channels.select(msg.sound).to_string(),
            when: msg.timestamp,
            target_uri: format!(
                "matrix:roomid/{}/e/{}",
                strip_sigil(&msg.room_id),
                strip_sigil(&msg.event_id)
            ),
            auto_cancel: true,
            conversation,
        };
        tracing::debug!(
            id = %id,
            channel = %notification.channel_id,
            messages = notification.conversation.messages.len(),
            "Showing room notification"
        );
        self.surface.notify(notification)?;
        Ok(id)
    }

    pub fn dismiss(&mut self, room_id: &str) -> Result<NotificationId, SurfaceError> {
        let id = NotificationId::for_room(room_id);
        let removed = self.surface.cancel(id)?;
        tracing::debug!(id = %id, removed, "Dismissed room notification");
        Ok(id)
    }
}

fn person(user: &PushUser) -> Person {
    Person {
        key: user.id.clone(),
        name: user.name.clone(),
        uri: format!("matrix:u/{}", strip_sigil(&user.id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemorySurface;

    fn user(id: &str, name: &str) -> PushUser {
        PushUser {
            id: id.into(),
            name: name.into(),
            avatar: None,
        }
    }

    fn message(room_id: &str, room_name: &str, sender: PushUser, text: &str, sound: bool) -> PushMessage {
        PushMessage {
            timestamp: 1_700_000_000_000,
            event_id: "$event1".into(),
            event_row_id: 1,
            room_id: room_id.into(),
            room_name: room_name.into(),
            room_avatar: None,
            sender,
            self_user: user("@me:example.org", "Me"),
            text: text.into(),
            image: None,
            mention: false,
            reply: false,
            sound,
        }
    }

    #[test]
    fn test_new_conversation_is_anchored_on_self() {
        let mut agg = NotificationAggregator::new(MemorySurface::new(), ChannelConfig::default());
        let id = agg
            .show(&message("!room:example.org", "Team", user("@bob:example.org", "Bob"), "hi", false))
            .unwrap();

        let n = agg.surface().get(id).unwrap();
        assert_eq!(n.conversation.user.key, "@me:example.org");
        assert_eq!(n.conversation.title.as_deref(), Some("Team"));
        assert_eq!(n.channel_id, "silent_notification");
        assert_eq!(n.target_uri, "matrix:roomid/room:example.org/e/event1");
        assert_eq!(n.conversation.messages[0].sender.uri, "matrix:u/bob:example.org");
    }

    #[test]
    fn test_direct_chat_has_no_title() {
        let mut agg = NotificationAggregator::new(MemorySurface::new(), ChannelConfig::default());
        let id = agg
            .show(&message("!dm:example.org", "Bob", user("@bob:example.org", "Bob"), "yo", true))
            .unwrap();
        let n = agg.surface().get(id).unwrap();
        assert!(n.conversation.title.is_none());
        assert_eq!(n.channel_id, "noisy_notification");
    }

    #[test]
    fn test_messages_append_per_room() {
        let mut agg = NotificationAggregator::new(MemorySurface::new(), ChannelConfig::default());
        let bob = user("@bob:example.org", "Bob");
        let carol = user("@carol:example.org", "Carol");
        let id = agg.show(&message("!r:example.org", "R", bob.clone(), "one", false)).unwrap();
        agg.show(&message("!r:example.org", "R", carol, "two", false)).unwrap();
        agg.show(&message("!other:example.org", "O", bob, "elsewhere", false)).unwrap();

        let n = agg.surface().get(id).unwrap();
        let texts: Vec<&str> = n.conversation.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["one", "two"]);
        assert_eq!(agg.surface().len(), 2);
    }

    #[test]
    fn test_dismiss_then_show_starts_fresh() {
        let mut agg = NotificationAggregator::new(MemorySurface::new(), ChannelConfig::default());
        let bob = user("@bob:example.org", "Bob");
        agg.show(&message("!r:example.org", "R", bob.clone(), "old", false)).unwrap();
        let id = agg.dismiss("!r:example.org").unwrap();
        assert!(agg.surface().get(id).is_none());

        agg.show(&message("!r:example.org", "R", bob, "new", false)).unwrap();
        assert_eq!(agg.surface().get(id).unwrap().conversation.messages.len(), 1);
    }
}
