use base64ct::Encoding;
use rand::RngCore;
use std::fmt::Debug;

/// Source of unguessable identifiers for client ids, secrets, codes and
/// tokens.
pub trait SecureRandom: Send + Sync + Debug {
    fn secure_random(&self) -> String;
}

/// 24 bytes from the thread-local CSPRNG, base64url without padding.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSecureRandom;

impl SecureRandom for OsSecureRandom {
    fn secure_random(&self) -> String {
        let mut bytes = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut bytes);
        base64ct::Base64UrlUnpadded::encode_string(&bytes)
    }
}
