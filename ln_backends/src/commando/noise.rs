//! BOLT 8 transport: the Noise_XK handshake (initiator side) and the
//! encrypted, length prefixed message framing that follows it.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use secp256k1::ecdh::SharedSecret;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use xerror::ln_backend::BackendError;

pub const PROTOCOL_NAME: &[u8] = b"Noise_XK_secp256k1_ChaChaPoly_SHA256";
pub const PROLOGUE: &[u8] = b"lightning";

pub const ACT_ONE_SIZE: usize = 50;
pub const ACT_TWO_SIZE: usize = 50;
pub const ACT_THREE_SIZE: usize = 66;

pub const MAC_SIZE: usize = 16;
pub const LENGTH_HEADER_SIZE: usize = 2 + MAC_SIZE;

const KEY_ROTATION_INTERVAL: u64 = 1000;

fn handshake_error(reason: &str) -> BackendError {
    BackendError::Transport(format!("noise handshake: {reason}"))
}

pub(crate) fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

pub(crate) fn hkdf(salt: &[u8; 32], ikm: &[u8]) -> ([u8; 32], [u8; 32]) {
    let mut okm = [0u8; 64];
    // 64 bytes is always a valid HKDF-SHA256 output length
    let _ = Hkdf::<Sha256>::new(Some(&salt[..]), ikm).expand(&[], &mut okm);
    let mut first = [0u8; 32];
    let mut second = [0u8; 32];
    first.copy_from_slice(&okm[..32]);
    second.copy_from_slice(&okm[32..]);
    (first, second)
}

pub(crate) fn ecdh(public_key: &PublicKey, secret_key: &SecretKey) -> [u8; 32] {
    SharedSecret::new(public_key, secret_key).secret_bytes()
}

fn nonce(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(&counter.to_le_bytes());
    nonce
}

pub(crate) fn encrypt_with_ad(key: &[u8; 32], counter: u64, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, BackendError> {
    ChaCha20Poly1305::new(Key::from_slice(key))
        .encrypt(Nonce::from_slice(&nonce(counter)), Payload { msg: plaintext, aad: ad })
        .map_err(|_| BackendError::Transport("encryption failed".to_string()))
}

pub(crate) fn decrypt_with_ad(key: &[u8; 32], counter: u64, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, BackendError> {
    ChaCha20Poly1305::new(Key::from_slice(key))
        .decrypt(Nonce::from_slice(&nonce(counter)), Payload { msg: ciphertext, aad: ad })
        .map_err(|_| BackendError::Transport("bad message authentication code".to_string()))
}

/// One direction of an established session.
#[derive(Debug, Clone)]
pub(crate) struct CipherState {
    key: [u8; 32],
    chaining_key: [u8; 32],
    counter: u64,
}

impl CipherState {
    pub(crate) fn new(key: [u8; 32], chaining_key: [u8; 32]) -> Self {
        Self {
            key,
            chaining_key,
            counter: 0,
        }
    }

    fn advance(&mut self) {
        self.counter += 1;
        if self.counter == KEY_ROTATION_INTERVAL {
            let (chaining_key, key) = hkdf(&self.chaining_key, &self.key);
            self.chaining_key = chaining_key;
            self.key = key;
            self.counter = 0;
        }
    }

    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, BackendError> {
        let ciphertext = encrypt_with_ad(&self.key, self.counter, &[], plaintext)?;
        self.advance();
        Ok(ciphertext)
    }

    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, BackendError> {
        let plaintext = decrypt_with_ad(&self.key, self.counter, &[], ciphertext)?;
        self.advance();
        Ok(plaintext)
    }
}

/// Established BOLT 8 session, framing and unframing Lightning messages.
#[derive(Debug, Clone)]
pub struct NoiseTransport {
    sender: CipherState,
    receiver: CipherState,
}

impl NoiseTransport {
    pub(crate) fn new(sender: CipherState, receiver: CipherState) -> Self {
        Self { sender, receiver }
    }

    pub fn encrypt_message(&mut self, message: &[u8]) -> Result<Vec<u8>, BackendError> {
        let length = u16::try_from(message.len())
            .map_err(|_| BackendError::Transport(format!("message of {} bytes is too large", message.len())))?;
        let mut frame = self.sender.encrypt(&length.to_be_bytes())?;
        frame.extend(self.sender.encrypt(message)?);
        Ok(frame)
    }

    /// Decrypts an 18 byte length header, returning the size of the body
    /// that follows it including its MAC.
    pub fn decrypt_length(&mut self, header: &[u8]) -> Result<usize, BackendError> {
        let length = self.receiver.decrypt(header)?;
        if length.len() != 2 {
            return Err(BackendError::Transport("invalid length header".to_string()));
        }
        Ok(u16::from_be_bytes([length[0], length[1]]) as usize + MAC_SIZE)
    }

    pub fn decrypt_body(&mut self, body: &[u8]) -> Result<Vec<u8>, BackendError> {
        self.receiver.decrypt(body)
    }
}

/// Initiator half of the Noise_XK handshake.
pub struct Handshake {
    local_key: SecretKey,
    ephemeral_key: SecretKey,
    remote_static: PublicKey,
    hash: [u8; 32],
    chaining_key: [u8; 32],
    temp_key: [u8; 32],
    remote_ephemeral: Option<PublicKey>,
}

impl Handshake {
    pub fn new(local_key: SecretKey, ephemeral_key: SecretKey, remote_static: PublicKey) -> Self {
        let chaining_key = sha256(&[PROTOCOL_NAME]);
        let hash = sha256(&[&chaining_key, PROLOGUE]);
        let hash = sha256(&[&hash, &remote_static.serialize()]);
        Self {
            local_key,
            ephemeral_key,
            remote_static,
            hash,
            chaining_key,
            temp_key: [0u8; 32],
            remote_ephemeral: None,
        }
    }

    pub fn act_one(&mut self) -> Result<[u8; ACT_ONE_SIZE], BackendError> {
        let secp = Secp256k1::new();
        let ephemeral_public = PublicKey::from_secret_key(&secp, &self.ephemeral_key).serialize();
        self.hash = sha256(&[&self.hash, &ephemeral_public]);

        let es = ecdh(&self.remote_static, &self.ephemeral_key);
        let (chaining_key, temp_key) = hkdf(&self.chaining_key, &es);
        self.chaining_key = chaining_key;
        self.temp_key = temp_key;

        let tag = encrypt_with_ad(&self.temp_key, 0, &self.hash, &[])?;
        self.hash = sha256(&[&self.hash, &tag]);

        let mut act = [0u8; ACT_ONE_SIZE];
        act[1..34].copy_from_slice(&ephemeral_public);
        act[34..].copy_from_slice(&tag);
        Ok(act)
    }

    pub fn act_two(&mut self, act: &[u8; ACT_TWO_SIZE]) -> Result<(), BackendError> {
        if act[0] != 0 {
            return Err(handshake_error("unknown version in act two"));
        }
        let remote_ephemeral =
            PublicKey::from_slice(&act[1..34]).map_err(|_| handshake_error("invalid ephemeral key in act two"))?;
        self.hash = sha256(&[&self.hash, &act[1..34]]);

        let ee = ecdh(&remote_ephemeral, &self.ephemeral_key);
        let (chaining_key, temp_key) = hkdf(&self.chaining_key, &ee);
        self.chaining_key = chaining_key;
        self.temp_key = temp_key;

        decrypt_with_ad(&self.temp_key, 0, &self.hash, &act[34..]).map_err(|_| handshake_error("act two MAC"))?;
        self.hash = sha256(&[&self.hash, &act[34..]]);
        self.remote_ephemeral = Some(remote_ephemeral);
        Ok(())
    }

    pub fn act_three(self) -> Result<([u8; ACT_THREE_SIZE], NoiseTransport), BackendError> {
        let remote_ephemeral = self
            .remote_ephemeral
            .ok_or_else(|| handshake_error("act three before act two"))?;
        let secp = Secp256k1::new();
        let local_public = PublicKey::from_secret_key(&secp, &self.local_key).serialize();

        let encrypted_key = encrypt_with_ad(&self.temp_key, 1, &self.hash, &local_public)?;
        let hash = sha256(&[&self.hash, &encrypted_key]);

        let se = ecdh(&remote_ephemeral, &self.local_key);
        let (chaining_key, temp_key) = hkdf(&self.chaining_key, &se);
        let tag = encrypt_with_ad(&temp_key, 0, &hash, &[])?;
        let (sending_key, receiving_key) = hkdf(&chaining_key, &[]);

        let mut act = [0u8; ACT_THREE_SIZE];
        act[1..50].copy_from_slice(&encrypted_key);
        act[50..].copy_from_slice(&tag);

        let transport = NoiseTransport::new(
            CipherState::new(sending_key, chaining_key),
            CipherState::new(receiving_key, chaining_key),
        );
        Ok((act, transport))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Responder half, only needed to drive the initiator in tests.
    pub(crate) struct Responder {
        local_key: SecretKey,
        ephemeral_key: SecretKey,
        hash: [u8; 32],
        chaining_key: [u8; 32],
        temp_key: [u8; 32],
        remote_ephemeral: Option<PublicKey>,
    }

    impl Responder {
        pub(crate) fn new(local_key: SecretKey, ephemeral_key: SecretKey) -> Self {
            let secp = Secp256k1::new();
            let local_public = PublicKey::from_secret_key(&secp, &local_key);
            let chaining_key = sha256(&[PROTOCOL_NAME]);
            let hash = sha256(&[&chaining_key, PROLOGUE]);
            let hash = sha256(&[&hash, &local_public.serialize()]);
            Self {
                local_key,
                ephemeral_key,
                hash,
                chaining_key,
                temp_key: [0u8; 32],
                remote_ephemeral: None,
            }
        }

        pub(crate) fn act_one(&mut self, act: &[u8; ACT_ONE_SIZE]) -> [u8; ACT_TWO_SIZE] {
            let remote_ephemeral = PublicKey::from_slice(&act[1..34]).unwrap();
            self.hash = sha256(&[&self.hash, &act[1..34]]);
            let es = ecdh(&remote_ephemeral, &self.local_key);
            let (chaining_key, temp_key) = hkdf(&self.chaining_key, &es);
            self.chaining_key = chaining_key;
            self.temp_key = temp_key;
            decrypt_with_ad(&self.temp_key, 0, &self.hash, &act[34..]).unwrap();
            self.hash = sha256(&[&self.hash, &act[34..]]);
            self.remote_ephemeral = Some(remote_ephemeral);

            let secp = Secp256k1::new();
            let ephemeral_public = PublicKey::from_secret_key(&secp, &self.ephemeral_key).serialize();
            self.hash = sha256(&[&self.hash, &ephemeral_public]);
            let ee = ecdh(&remote_ephemeral, &self.ephemeral_key);
            let (chaining_key, temp_key) = hkdf(&self.chaining_key, &ee);
            self.chaining_key = chaining_key;
            self.temp_key = temp_key;
            let tag = encrypt_with_ad(&self.temp_key, 0, &self.hash, &[]).unwrap();
            self.hash = sha256(&[&self.hash, &tag]);

            let mut reply = [0u8; ACT_TWO_SIZE];
            reply[1..34].copy_from_slice(&ephemeral_public);
            reply[34..].copy_from_slice(&tag);
            reply
        }

        pub(crate) fn act_three(self, act: &[u8; ACT_THREE_SIZE]) -> (PublicKey, NoiseTransport) {
            let remote_static = decrypt_with_ad(&self.temp_key, 1, &self.hash, &act[1..50]).unwrap();
            let hash = sha256(&[&self.hash, &act[1..50]]);
            let remote_static = PublicKey::from_slice(&remote_static).unwrap();
            let se = ecdh(&remote_static, &self.ephemeral_key);
            let (chaining_key, temp_key) = hkdf(&self.chaining_key, &se);
            decrypt_with_ad(&temp_key, 0, &hash, &act[50..]).unwrap();
            let (initiator_sending, initiator_receiving) = hkdf(&chaining_key, &[]);
            let transport = NoiseTransport::new(
                CipherState::new(initiator_receiving, chaining_key),
                CipherState::new(initiator_sending, chaining_key),
            );
            (remote_static, transport)
        }
    }

    fn key(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    pub(crate) fn handshake_pair() -> (NoiseTransport, NoiseTransport) {
        let secp = Secp256k1::new();
        let responder_static = key(0x21);
        let mut initiator = Handshake::new(key(0x11), key(0x12), PublicKey::from_secret_key(&secp, &responder_static));
        let mut responder = Responder::new(responder_static, key(0x22));

        let act_one = initiator.act_one().unwrap();
        let act_two = responder.act_one(&act_one);
        initiator.act_two(&act_two).unwrap();
        let (act_three, initiator_transport) = initiator.act_three().unwrap();
        let (remote_static, responder_transport) = responder.act_three(&act_three);
        assert_eq!(remote_static, PublicKey::from_secret_key(&secp, &key(0x11)));
        (initiator_transport, responder_transport)
    }

    fn roundtrip(from: &mut NoiseTransport, to: &mut NoiseTransport, message: &[u8]) -> Vec<u8> {
        let frame = from.encrypt_message(message).unwrap();
        let body_len = to.decrypt_length(&frame[..LENGTH_HEADER_SIZE]).unwrap();
        assert_eq!(body_len, message.len() + MAC_SIZE);
        to.decrypt_body(&frame[LENGTH_HEADER_SIZE..]).unwrap()
    }

    #[test]
    fn test_act_sizes_and_versions() {
        let secp = Secp256k1::new();
        let mut initiator = Handshake::new(key(1), key(2), PublicKey::from_secret_key(&secp, &key(3)));
        let act_one = initiator.act_one().unwrap();
        assert_eq!(act_one.len(), ACT_ONE_SIZE);
        assert_eq!(act_one[0], 0);

        let mut bad_act_two = [0u8; ACT_TWO_SIZE];
        bad_act_two[0] = 1;
        assert!(initiator.act_two(&bad_act_two).is_err());
    }

    #[test]
    fn test_messages_flow_both_ways() {
        let (mut initiator, mut responder) = handshake_pair();
        assert_eq!(roundtrip(&mut initiator, &mut responder, b"hello"), b"hello");
        assert_eq!(roundtrip(&mut responder, &mut initiator, b"world"), b"world");
    }

    #[test]
    fn test_keys_rotate_in_lockstep() {
        let (mut initiator, mut responder) = handshake_pair();
        // two nonces per message, so this crosses several rotations
        for i in 0..1500u32 {
            let message = i.to_be_bytes();
            assert_eq!(roundtrip(&mut initiator, &mut responder, &message), message);
        }
    }

    #[test]
    fn test_tampered_frame_is_rejected() {
        let (mut initiator, mut responder) = handshake_pair();
        let mut frame = initiator.encrypt_message(b"hello").unwrap();
        frame[0] ^= 0xff;
        assert!(responder.decrypt_length(&frame[..LENGTH_HEADER_SIZE]).is_err());
    }

    #[test]
    fn test_initiator_matches_bolt8_vectors() {
        let secp = Secp256k1::new();
        let responder_static = PublicKey::from_secret_key(&secp, &key(0x21));
        assert_eq!(
            hex::encode(responder_static.serialize()),
            "028d7500dd4c12685d1f568b4c2b5048e8534b873319f3a8daa612b469132ec7f7"
        );
        let mut initiator = Handshake::new(key(0x11), key(0x12), responder_static);

        let act_one = initiator.act_one().unwrap();
        assert_eq!(
            hex::encode(act_one),
            "00036360e856310ce5d294e8be33fc807077dc56ac80d95d9cd4ddbd21325eff73f70df6086551151f58b8afe6c195782c6a"
        );

        let act_two: [u8; ACT_TWO_SIZE] = hex::decode(
            "0002466d7fcae563e5cb09a0d1870bb580344804617879a14949cf22285f1bae3f276e2470b93aac583c9ef6eafca3f730ae",
        )
        .unwrap()
        .try_into()
        .unwrap();
        initiator.act_two(&act_two).unwrap();

        let (act_three, mut transport) = initiator.act_three().unwrap();
        assert_eq!(
            hex::encode(act_three),
            "00b9e3a702e93e3a9948c2ed6e5fd7590a6e1c3a0344cfc9d5b57357049aa22355361aa02e55a8fc28fef5bd6d71ad0c38228dc68b1c466263b47fdf31e560e139ba"
        );

        let expected = [
            (0, "cf2b30ddf0cf3f80e7c35a6e6730b59fe802473180f396d88a8fb0db8cbcf25d2f214cf9ea1d95"),
            (1, "72887022101f0b6753e0c7de21657d35a4cb2a1f5cde2650528bbc8f837d0f0d7ad833b1a256a1"),
            (500, "178cb9d7387190fa34db9c2d50027d21793c9bc2d40b1e14dcf30ebeeeb220f48364f7a4c68bf8"),
            (501, "1b186c57d44eb6de4c057c49940d79bb838a145cb528d6e8fd26dbe50a60ca2c104b56b60e45bd"),
        ];
        let mut frames = Vec::new();
        for _ in 0..=501 {
            frames.push(hex::encode(transport.encrypt_message(b"hello").unwrap()));
        }
        for (index, frame) in expected {
            assert_eq!(frames[index], frame, "message {index}");
        }
    }
}
