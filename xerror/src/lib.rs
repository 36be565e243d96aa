pub mod api;
pub mod ln_backend;
pub mod nostr;
pub mod pay;
