pub mod config;
pub mod lnurl;
pub mod nostr;
pub mod xlogging;

pub mod time {
    use std::time::SystemTime;

    fn since_epoch() -> std::time::Duration {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
    }

    pub fn time_now() -> u64 {
        since_epoch().as_millis() as u64
    }

    pub fn unix_seconds() -> u64 {
        since_epoch().as_secs()
    }
}
