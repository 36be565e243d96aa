use bech32::ToBase32;
use core_types::Msat;
use nostr_sdk::nostr::event;
use nostr_sdk::prelude::{Event, EventId, Keys};
use xerror::nostr::ZapError;

pub const ZAP_REQUEST_KIND: u64 = 9734;
pub const ZAP_RECEIPT_KIND: u64 = 9735;

const ANONYMOUS_ZAPPER: &str = "anonymous Zapper 🤙";

/// A zap request that passed validation, together with the exact string
/// committed to by the invoice's description hash.
#[derive(Debug, Clone)]
pub struct ZapRequest {
    pub event: Event,
    pub description: String,
}

impl ZapRequest {
    pub fn description_hash(&self) -> String {
        description_hash(&self.description)
    }

    pub fn comment(&self) -> &str {
        &self.event.content
    }

    /// URLs of the `relays` tag, in tag order.
    pub fn relays(&self) -> Vec<String> {
        custom_tag_values(&self.event, "relays").unwrap_or_default()
    }

    pub fn is_anonymous(&self) -> bool {
        custom_tag_values(&self.event, "anon").is_some()
    }

    pub fn zapped_note(&self) -> Option<EventId> {
        self.event.tags.iter().find_map(|tag| match tag {
            event::Tag::Event(id, _, _) => Some(*id),
            _ => None,
        })
    }

    pub fn sender_label(&self) -> String {
        if self.is_anonymous() {
            return ANONYMOUS_ZAPPER.to_string();
        }
        match npub(&self.event.pubkey.serialize()) {
            Some(npub) => format!("@{npub}"),
            None => ANONYMOUS_ZAPPER.to_string(),
        }
    }

    pub fn note_label(&self) -> Option<String> {
        let id = self.zapped_note()?;
        let bytes = hex::decode(id.to_hex()).ok()?;
        bech32::encode("note", bytes.to_base32()).ok().map(|note| format!("@{note}"))
    }
}

pub fn description_hash(source: &str) -> String {
    sha256::digest(source)
}

pub fn npub(pubkey: &[u8]) -> Option<String> {
    bech32::encode("npub", pubkey.to_base32()).ok()
}

pub fn check_comment(comment: &str, comment_allowed: usize) -> Result<(), ZapError> {
    if comment.chars().count() > comment_allowed {
        return Err(ZapError::CommentTooLong(comment_allowed));
    }
    Ok(())
}

fn custom_tag_values(nostr_event: &Event, name: &str) -> Option<Vec<String>> {
    nostr_event.tags.iter().find_map(|tag| match tag {
        event::Tag::Generic(event::TagKind::Custom(tag), values) if tag == name => Some(values.clone()),
        _ => None,
    })
}

/// Parses a NIP-57 zap request and checks its signature, kind, exactly one
/// `p` tag, at most one `e` tag and, when present, its `amount` tag against
/// the requested amount.
pub fn validate_zap_request(json: &str, amount_msat: Msat) -> Result<Event, ZapError> {
    let nostr_event = Event::from_json(json).map_err(|err| match err {
        event::Error::InvalidSignature | event::Error::Secp256k1(_) => ZapError::InvalidSignature,
        event::Error::Json(_) | event::Error::Hex(_) => ZapError::MalformedZapEvent,
    })?;

    if nostr_event.kind.as_u64() != ZAP_REQUEST_KIND {
        return Err(ZapError::WrongKind);
    }

    if nostr_event.tags.is_empty() {
        return Err(ZapError::MissingRequiredTag("p".to_string()));
    }

    let mut pubkey_tags_count = 0;
    let mut event_tags_count = 0;
    let mut amount = Option::<u64>::default();
    for tag in nostr_event.tags.iter() {
        match tag {
            event::Tag::PubKey(_, _) => pubkey_tags_count += 1,
            event::Tag::Event(_, _, _) => event_tags_count += 1,
            event::Tag::Generic(event::TagKind::Custom(tag), values) if tag == "amount" => {
                amount = values.first().and_then(|value| value.parse().ok());
            }
            _ => {}
        }
    }

    if pubkey_tags_count < 1 {
        return Err(ZapError::MissingRequiredTag("p".to_string()));
    }
    if pubkey_tags_count > 1 {
        return Err(ZapError::InvalidTagCount("p".to_string()));
    }
    if event_tags_count > 1 {
        return Err(ZapError::InvalidTagCount("e".to_string()));
    }

    if let Some(value) = amount {
        if value != amount_msat {
            return Err(ZapError::AmountMismatch);
        }
    }

    Ok(nostr_event)
}

/// Validates `raw` and settles the description-hash source. The raw JSON is
/// kept byte for byte unless the event has no content and a comment was
/// passed separately, in which case the comment is written into `content`.
pub fn zap_context(
    raw: &str,
    comment: Option<&str>,
    amount_msat: Msat,
    comment_allowed: usize,
) -> Result<ZapRequest, ZapError> {
    let mut nostr_event = validate_zap_request(raw, amount_msat)?;

    let comment = comment.unwrap_or_default();
    check_comment(comment, comment_allowed)?;

    if !nostr_event.content.is_empty() || comment.is_empty() {
        return Ok(ZapRequest {
            event: nostr_event,
            description: raw.to_string(),
        });
    }

    let mut value = serde_json::from_str::<serde_json::Value>(raw).map_err(|_| ZapError::MalformedZapEvent)?;
    let object = value.as_object_mut().ok_or(ZapError::MalformedZapEvent)?;
    object.insert("content".to_string(), serde_json::Value::from(comment));
    let description = serde_json::to_string(&value).map_err(|_| ZapError::SerializationFailed)?;
    nostr_event.content = comment.to_string();

    Ok(ZapRequest {
        event: nostr_event,
        description,
    })
}

/// Signs the kind 9735 receipt for a settled zap.
pub fn build_receipt(keys: &Keys, zap: &ZapRequest, bolt11: &str) -> Result<Event, ZapError> {
    let bolt11_tag = event::Tag::Generic(
        event::TagKind::Custom(String::from("bolt11")),
        vec![String::from(bolt11)],
    );
    let description_tag = event::Tag::Generic(
        event::TagKind::Custom(String::from("description")),
        vec![zap.description.clone()],
    );
    let pubkey_tag = zap
        .event
        .tags
        .iter()
        .find(|tag| matches!(tag, event::Tag::PubKey(_, _)));
    let event_tag = zap
        .event
        .tags
        .iter()
        .find(|tag| matches!(tag, event::Tag::Event(_, _, _)));
    let tags = pubkey_tag
        .into_iter()
        .chain(event_tag)
        .cloned()
        .chain([bolt11_tag, description_tag])
        .collect::<Vec<_>>();
    let builder = event::EventBuilder::new(event::Kind::Custom(ZAP_RECEIPT_KIND), "", tags.as_slice());
    builder.to_event(keys).map_err(|_| ZapError::ReceiptSigningFailed)
}
