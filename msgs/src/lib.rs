pub mod lnurl;
pub mod nostr;
