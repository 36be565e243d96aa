//! Signed invoices for tests of crates that decode bolt11.

use bitcoin_hashes::{sha256, Hash};
use lightning::ln::PaymentSecret;
use lightning_invoice::{Currency, InvoiceBuilder};
use secp256k1::{Secp256k1, SecretKey};

/// A mainnet invoice committing to `sha256(description_source)`.
pub fn signed_invoice(amount_msat: u64, description_source: &str, payment_hash: [u8; 32]) -> String {
    let private_key = SecretKey::from_slice(&[42; 32]).expect("valid key");
    let payment_hash = sha256::Hash::from_slice(&payment_hash).expect("32 bytes");
    let description_hash = sha256::Hash::hash(description_source.as_bytes());

    InvoiceBuilder::new(Currency::Bitcoin)
        .description_hash(description_hash)
        .payment_hash(payment_hash)
        .payment_secret(PaymentSecret([42; 32]))
        .current_timestamp()
        .min_final_cltv_expiry(144)
        .amount_milli_satoshis(amount_msat)
        .build_signed(|hash| Secp256k1::new().sign_ecdsa_recoverable(hash, &private_key))
        .expect("invoice builds")
        .to_string()
}
