use core_types::{Account, MetadataImage};

/// LNURL-pay metadata document. Its encoding is hashed into plain
/// (non-zap) invoices, so `encode` must stay stable for a given account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub description: String,
    pub lightning_address: String,
    pub image: Option<MetadataImage>,
}

impl Metadata {
    pub fn for_account(account: &Account) -> Self {
        let address = account.address();
        Self {
            description: format!("Pay to {address}"),
            lightning_address: address,
            image: account.image.clone().filter(|image| !image.ext.is_empty()),
        }
    }

    pub fn encode(&self) -> String {
        let mut entries = vec![["text/plain".to_string(), self.description.clone()]];
        if let Some(image) = &self.image {
            entries.push([format!("image/{};base64", image.ext), image.data.clone()]);
        }
        if !self.lightning_address.is_empty() {
            entries.push(["text/identifier".to_string(), self.lightning_address.clone()]);
        }
        serde_json::Value::from(
            entries
                .into_iter()
                .map(|[mime, value]| serde_json::Value::from(vec![mime, value]))
                .collect::<Vec<_>>(),
        )
        .to_string()
    }

    pub fn description_hash(&self) -> String {
        sha256::digest(self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            name: "alice".to_string(),
            domain: "example.com".to_string(),
            kind: "lnd".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_encode_without_image() {
        let metadata = Metadata::for_account(&account());
        assert_eq!(
            metadata.encode(),
            r#"[["text/plain","Pay to alice@example.com"],["text/identifier","alice@example.com"]]"#
        );
    }

    #[test]
    fn test_encode_with_image() {
        let mut account = account();
        account.image = Some(MetadataImage {
            ext: "png".to_string(),
            data: "iVBORw0K".to_string(),
        });
        let metadata = Metadata::for_account(&account);
        assert_eq!(
            metadata.encode(),
            r#"[["text/plain","Pay to alice@example.com"],["image/png;base64","iVBORw0K"],["text/identifier","alice@example.com"]]"#
        );
        assert_eq!(metadata.description_hash(), sha256::digest(metadata.encode()));
    }
}
