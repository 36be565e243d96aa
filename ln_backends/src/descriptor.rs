use core_types::{Account, BackendKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LndParams {
    pub host: String,
    /// Hex encoded, whatever encoding the account stored.
    pub macaroon: String,
    pub cert: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LnBitsParams {
    pub host: String,
    pub key: String,
    pub cert: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparkoParams {
    pub host: String,
    pub key: String,
    pub cert: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandoParams {
    pub host: String,
    pub node_id: String,
    pub rune: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LnPayParams {
    pub public_access_key: String,
    pub wallet_invoice_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EclairParams {
    pub host: String,
    pub password: String,
    pub cert: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrikeParams {
    pub key: String,
    pub username: String,
    pub currency: String,
}

/// One variant per node dialect, built fresh from an account for every
/// request. Each variant only carries what its RPC needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Lnd(LndParams),
    LnBits(LnBitsParams),
    Sparko(SparkoParams),
    Commando(CommandoParams),
    LnPay(LnPayParams),
    Eclair(EclairParams),
    Strike(StrikeParams),
    /// Kind string the server cannot dispatch. Has no capabilities.
    Unsupported(String),
}

impl Backend {
    pub fn from_account(account: &Account) -> Self {
        let kind = match account.backend_kind() {
            Ok(kind) => kind,
            Err(_) => return Backend::Unsupported(account.kind.clone()),
        };
        let cert = account.cert.clone().filter(|cert| !cert.is_empty());

        match kind {
            BackendKind::Lnd => Backend::Lnd(LndParams {
                host: account.host.clone(),
                macaroon: macaroon_to_hex(&account.key),
                cert,
            }),
            BackendKind::LnBits => Backend::LnBits(LnBitsParams {
                host: account.host.clone(),
                key: account.key.clone(),
                cert,
            }),
            BackendKind::Sparko => Backend::Sparko(SparkoParams {
                host: account.host.clone(),
                key: account.key.clone(),
                cert,
            }),
            BackendKind::Commando => Backend::Commando(CommandoParams {
                host: account.host.clone(),
                node_id: account.node_id.clone(),
                rune: account.rune.clone(),
            }),
            BackendKind::LnPay => Backend::LnPay(LnPayParams {
                public_access_key: account.pak.clone(),
                wallet_invoice_key: account.waki.clone(),
            }),
            BackendKind::Eclair => Backend::Eclair(EclairParams {
                host: account.host.clone(),
                password: account.key.clone(),
                cert,
            }),
            BackendKind::Strike => Backend::Strike(StrikeParams {
                key: account.key.clone(),
                username: account.strike_username.clone().unwrap_or_else(|| account.name.clone()),
                currency: account.strike_currency.clone().unwrap_or_else(|| "BTC".to_string()),
            }),
        }
    }

    pub fn kind_name(&self) -> &str {
        match self {
            Backend::Lnd(_) => "lnd",
            Backend::LnBits(_) => "lnbits",
            Backend::Sparko(_) => "sparko",
            Backend::Commando(_) => "commando",
            Backend::LnPay(_) => "lnpay",
            Backend::Eclair(_) => "eclair",
            Backend::Strike(_) => "strike",
            Backend::Unsupported(kind) => kind,
        }
    }

    /// PEM encoded CA certificate to trust for this node.
    pub fn certificate(&self) -> Option<&str> {
        match self {
            Backend::Lnd(params) => params.cert.as_deref(),
            Backend::LnBits(params) => params.cert.as_deref(),
            Backend::Sparko(params) => params.cert.as_deref(),
            Backend::Eclair(params) => params.cert.as_deref(),
            Backend::Commando(_) | Backend::LnPay(_) | Backend::Strike(_) | Backend::Unsupported(_) => None,
        }
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            Backend::Lnd(params) => Some(&params.host),
            Backend::LnBits(params) => Some(&params.host),
            Backend::Sparko(params) => Some(&params.host),
            Backend::Commando(params) => Some(&params.host),
            Backend::Eclair(params) => Some(&params.host),
            Backend::LnPay(_) | Backend::Strike(_) | Backend::Unsupported(_) => None,
        }
    }

    pub fn is_onion(&self) -> bool {
        self.host().map_or(false, |host| host.contains(".onion"))
    }

    /// Self-hosted nodes without a configured CA commonly run self-signed
    /// TLS, hosted services never do.
    pub fn is_self_hosted(&self) -> bool {
        self.host().is_some()
    }

    pub fn supports_settlement_check(&self) -> bool {
        matches!(
            self,
            Backend::Lnd(_) | Backend::LnBits(_) | Backend::Sparko(_) | Backend::Commando(_)
        )
    }
}

/// LND macaroons are stored either hex or base64 encoded. The REST API
/// wants hex.
pub fn macaroon_to_hex(macaroon: &str) -> String {
    if hex::decode(macaroon).is_ok() {
        return macaroon.to_string();
    }
    match base64::decode(macaroon) {
        Ok(bytes) => hex::encode(bytes),
        Err(_) => macaroon.to_string(),
    }
}
