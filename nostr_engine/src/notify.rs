use core_types::{msat_to_sat, Account, Msat};
use msgs::nostr::NostrPrivateMessage;
use nostr_sdk::prelude::{Event, EventBuilder, FromPkStr, Keys};
use slog as log;
use slog::Logger;
use utils::nostr::ZapRequest;
use xerror::nostr::NotifyError;

use crate::relay_pool::{PublishReport, RelayPublisher};

pub fn format_amount(msat: Msat) -> String {
    match msat_to_sat(msat) {
        1 => "1 sat".to_string(),
        sats => format!("{sats} sats"),
    }
}

/// Whether the account owner asked to hear about this kind of payment.
pub fn wants_notification(account: &Account, zap: Option<&ZapRequest>) -> bool {
    if account.npub.as_deref().map_or(true, str::is_empty) {
        return false;
    }
    match zap {
        Some(zap) if !zap.comment().is_empty() => account.notify_zaps || account.notify_zap_comment,
        Some(_) => account.notify_zaps,
        None => account.notify_non_zap,
    }
}

pub fn payment_message(account: &Account, amount_msat: Msat, zap: Option<&ZapRequest>) -> String {
    let amount = format_amount(amount_msat);
    let zap = match zap {
        Some(zap) => zap,
        None => return format!("⚡ You received {} on {}.", amount, account.address()),
    };

    let target = zap
        .note_label()
        .map(|note| format!(" for {note}"))
        .unwrap_or_default();
    let sender = zap.sender_label();
    match zap.comment() {
        "" => format!("⚡ {sender} zapped you {amount}{target}."),
        comment => format!("⚡ {sender} zapped you {amount}{target}: \"{comment}\""),
    }
}

/// NIP-04 encrypted direct message from `keys` to `recipient` (hex or npub).
pub fn build_direct_message(keys: &Keys, recipient: &str, text: &str) -> Result<Event, NotifyError> {
    let recipient_keys =
        Keys::from_pk_str(recipient).map_err(|_| NotifyError::InvalidRecipient(recipient.to_string()))?;
    EventBuilder::new_encrypted_direct_msg(keys, recipient_keys.public_key(), text)
        .and_then(|builder| builder.to_event(keys))
        .map_err(|err| NotifyError::EncryptionFailed(err.to_string()))
}

/// Sends payment notifications to account owners as direct messages.
#[derive(Clone)]
pub struct Notifier {
    keys: Keys,
    publisher: RelayPublisher,
    logger: Logger,
}

impl Notifier {
    pub fn new(keys: Keys, publisher: RelayPublisher, logger: Logger) -> Self {
        Self {
            keys,
            publisher,
            logger,
        }
    }

    /// Returns `None` when the account does not want this notification.
    pub async fn notify_payment(
        &self,
        account: &Account,
        amount_msat: Msat,
        zap: Option<&ZapRequest>,
    ) -> Result<Option<PublishReport>, NotifyError> {
        if !wants_notification(account, zap) {
            return Ok(None);
        }
        let message = NostrPrivateMessage {
            pubkey: account.npub.clone().unwrap_or_default(),
            text: payment_message(account, amount_msat, zap),
        };
        self.send(&message, &account.relays).await.map(Some)
    }

    pub async fn send(&self, message: &NostrPrivateMessage, relays: &[String]) -> Result<PublishReport, NotifyError> {
        let direct_message = build_direct_message(&self.keys, &message.pubkey, &message.text)?;
        log::info!(self.logger, "Sending payment notification to {}", message.pubkey);
        Ok(self.publisher.publish(&direct_message, relays).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{RelayConnection, RelayConnector};
    use crate::relay_pool::RelayPublisherSettings;
    use async_trait::async_trait;
    use nostr_sdk::nostr::event::{Kind, Tag, TagKind};
    use nostr_sdk::nostr::nips::nip04;
    use std::sync::{Arc, Mutex};
    use xerror::nostr::RelayError;

    fn zap(comment: &str, note: bool, anonymous: bool) -> (Keys, ZapRequest) {
        let sender = Keys::generate();
        let recipient = Keys::generate();
        let mut tags = vec![Tag::PubKey(recipient.public_key(), None)];
        if note {
            let zapped = EventBuilder::new(Kind::TextNote, "gm", &[]).to_event(&recipient).unwrap();
            tags.push(Tag::Event(zapped.id, None, None));
        }
        if anonymous {
            tags.push(Tag::Generic(TagKind::Custom("anon".to_string()), vec![]));
        }
        let request = EventBuilder::new(Kind::Custom(9734), comment, &tags)
            .to_event(&sender)
            .unwrap();
        let raw = serde_json::to_string(&request).unwrap();
        (sender, utils::nostr::zap_context(&raw, None, 21_000, 500).unwrap())
    }

    fn account() -> Account {
        Account {
            name: "alice".to_string(),
            domain: "example.com".to_string(),
            kind: "lnbits".to_string(),
            npub: Some(Keys::generate().public_key().to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_amount_wording() {
        assert_eq!(format_amount(1_000), "1 sat");
        assert_eq!(format_amount(1_999), "1 sat");
        assert_eq!(format_amount(21_000), "21 sats");
        assert_eq!(format_amount(999), "0 sats");
    }

    #[test]
    fn test_notification_flags() {
        let (_, with_comment) = zap("great post", false, false);
        let (_, without_comment) = zap("", false, false);

        let mut account = account();
        assert!(!wants_notification(&account, Some(&with_comment)));
        assert!(!wants_notification(&account, None));

        account.notify_zap_comment = true;
        assert!(wants_notification(&account, Some(&with_comment)));
        assert!(!wants_notification(&account, Some(&without_comment)));

        account.notify_zaps = true;
        assert!(wants_notification(&account, Some(&without_comment)));
        assert!(!wants_notification(&account, None));

        account.notify_non_zap = true;
        assert!(wants_notification(&account, None));

        account.npub = None;
        assert!(!wants_notification(&account, Some(&with_comment)));
    }

    #[test]
    fn test_message_wording() {
        let account = account();
        assert_eq!(
            payment_message(&account, 1_000, None),
            "⚡ You received 1 sat on alice@example.com."
        );

        let (sender, plain) = zap("", false, false);
        let npub = utils::nostr::npub(&sender.public_key().serialize()).unwrap();
        assert_eq!(
            payment_message(&account, 21_000, Some(&plain)),
            format!("⚡ @{npub} zapped you 21 sats.")
        );

        let (_, commented) = zap("great post", true, true);
        let message = payment_message(&account, 21_000, Some(&commented));
        assert!(message.starts_with("⚡ anonymous Zapper 🤙 zapped you 21 sats for @note1"));
        assert!(message.ends_with(": \"great post\""));
    }

    #[test]
    fn test_direct_message_is_encrypted_for_recipient() {
        let server = Keys::generate();
        let owner = Keys::generate();
        let recipient = utils::nostr::npub(&owner.public_key().serialize()).unwrap();

        let message = build_direct_message(&server, &recipient, "⚡ You received 1 sat").unwrap();
        assert_eq!(message.kind.as_u64(), 4);
        assert_eq!(message.pubkey, server.public_key());
        assert!(message
            .tags
            .iter()
            .any(|tag| matches!(tag, Tag::PubKey(pubkey, _) if *pubkey == owner.public_key())));
        assert_ne!(message.content, "⚡ You received 1 sat");

        let decrypted = nip04::decrypt(&owner.secret_key().unwrap(), &server.public_key(), &message.content).unwrap();
        assert_eq!(decrypted, "⚡ You received 1 sat");
    }

    #[test]
    fn test_invalid_recipient() {
        let result = build_direct_message(&Keys::generate(), "not-a-key", "hi");
        assert_eq!(result.unwrap_err(), NotifyError::InvalidRecipient("not-a-key".to_string()));
    }

    #[derive(Default)]
    struct Recorder {
        published: Mutex<Vec<(String, u64)>>,
    }

    struct RecordingConnector(Arc<Recorder>);

    struct RecordingConnection {
        url: String,
        recorder: Arc<Recorder>,
    }

    #[async_trait]
    impl RelayConnector for RecordingConnector {
        async fn connect(&self, url: &str) -> Result<Arc<dyn RelayConnection>, RelayError> {
            Ok(Arc::new(RecordingConnection {
                url: url.to_string(),
                recorder: self.0.clone(),
            }))
        }
    }

    #[async_trait]
    impl RelayConnection for RecordingConnection {
        async fn publish(&self, event: &Event) -> Result<(), RelayError> {
            self.recorder
                .published
                .lock()
                .unwrap()
                .push((self.url.clone(), event.kind.as_u64()));
            Ok(())
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_notifier_publishes_to_account_relays() {
        let recorder = Arc::new(Recorder::default());
        let settings = RelayPublisherSettings {
            default_relays: vec!["wss://default.relay".to_string()],
            ..Default::default()
        };
        let publisher = RelayPublisher::new(
            settings,
            Arc::new(RecordingConnector(recorder.clone())),
            utils::xlogging::discard(),
        );
        let notifier = Notifier::new(Keys::generate(), publisher, utils::xlogging::discard());

        let mut account = account();
        account.relays = vec!["wss://owner.relay/".to_string()];
        let report = notifier.notify_payment(&account, 5_000, None).await.unwrap();
        assert!(report.is_none());
        assert!(recorder.published.lock().unwrap().is_empty());

        account.notify_non_zap = true;
        let report = notifier.notify_payment(&account, 5_000, None).await.unwrap().unwrap();
        assert_eq!(report.delivered, vec!["wss://owner.relay", "wss://default.relay"]);
        let published = recorder.published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert!(published.iter().all(|(_, kind)| *kind == 4));
    }
}
