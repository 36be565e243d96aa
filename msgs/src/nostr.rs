use serde::{Deserialize, Serialize};

/// Direct message to a Nostr user, `pubkey` in hex or npub form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NostrPrivateMessage {
    pub pubkey: String,
    pub text: String,
}
