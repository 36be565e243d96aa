use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

pub const MSATS_IN_SAT: u64 = 1000;

pub const DEFAULT_MIN_SENDABLE_MSAT: u64 = 1_000;
pub const DEFAULT_MAX_SENDABLE_MSAT: u64 = 1_000_000_000;
pub const DEFAULT_COMMENT_ALLOWED: usize = 500;

/// Relays every receipt is broadcast to when no relay list is configured.
pub const DEFAULT_RELAYS: [&str; 5] = [
    "wss://relay.damus.io",
    "wss://nostr.mutinywallet.com",
    "wss://relay.nostrgraph.net",
    "wss://nos.lol",
    "wss://relay.snort.social",
];

pub type Msat = u64;
pub type Sat = u64;

pub fn msat_to_sat(msat: Msat) -> Sat {
    msat / MSATS_IN_SAT
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Lnd,
    LnBits,
    Sparko,
    Commando,
    LnPay,
    Eclair,
    Strike,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Lnd => "lnd",
            Self::LnBits => "lnbits",
            Self::Sparko => "sparko",
            Self::Commando => "commando",
            Self::LnPay => "lnpay",
            Self::Eclair => "eclair",
            Self::Strike => "strike",
        };

        write!(f, "{kind}")
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(kind: &str) -> Result<BackendKind, Self::Err> {
        match kind.to_lowercase().as_str() {
            "lnd" => Ok(BackendKind::Lnd),
            "lnbits" => Ok(BackendKind::LnBits),
            "sparko" => Ok(BackendKind::Sparko),
            "commando" => Ok(BackendKind::Commando),
            "lnpay" => Ok(BackendKind::LnPay),
            "eclair" => Ok(BackendKind::Eclair),
            "strike" => Ok(BackendKind::Strike),
            _ => Err(format!("unknown backend kind {kind}")),
        }
    }
}

/// Profile picture advertised in the LNURL metadata, `data` base64 encoded.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct MetadataImage {
    pub ext: String,
    pub data: String,
}

/// Account record as kept by the account store. The `kind` stays a plain
/// string because the store may hold kinds this server cannot dispatch.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Account {
    pub name: String,
    #[serde(default)]
    pub domain: String,
    pub kind: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub key: String,
    /// LNPay public access key.
    #[serde(default)]
    pub pak: String,
    /// LNPay wallet invoice key.
    #[serde(default)]
    pub waki: String,
    #[serde(default, rename = "nodeid")]
    pub node_id: String,
    #[serde(default)]
    pub rune: String,
    /// PEM encoded CA certificate of the node, if it is not publicly trusted.
    #[serde(default)]
    pub cert: Option<String>,
    #[serde(default)]
    pub strike_username: Option<String>,
    #[serde(default)]
    pub strike_currency: Option<String>,
    #[serde(default, rename = "minSendable")]
    pub min_sendable: Option<Msat>,
    #[serde(default, rename = "maxSendable")]
    pub max_sendable: Option<Msat>,
    #[serde(default)]
    pub npub: Option<String>,
    #[serde(default)]
    pub relays: Vec<String>,
    #[serde(default)]
    pub image: Option<MetadataImage>,
    #[serde(default, rename = "notifyzaps")]
    pub notify_zaps: bool,
    #[serde(default, rename = "notifycomments")]
    pub notify_zap_comment: bool,
    #[serde(default, rename = "notifynonzaps")]
    pub notify_non_zap: bool,
}

impl Account {
    pub fn address(&self) -> String {
        format!("{}@{}", self.name, self.domain)
    }

    pub fn backend_kind(&self) -> Result<BackendKind, String> {
        BackendKind::from_str(&self.kind)
    }

    /// Inclusive msat bounds, falling back to the server defaults.
    pub fn sendable_bounds(&self) -> (Msat, Msat) {
        (
            self.min_sendable.unwrap_or(DEFAULT_MIN_SENDABLE_MSAT),
            self.max_sendable.unwrap_or(DEFAULT_MAX_SENDABLE_MSAT),
        )
    }

    pub fn is_sendable(&self, amount: Msat) -> bool {
        let (min, max) = self.sendable_bounds();
        amount >= min && amount <= max
    }
}
