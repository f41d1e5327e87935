use thiserror::Error;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("no passphrase configured for encrypted documents")]
    MissingKey,
    #[error("decryption failed: {0}")]
    Failed(String),
}

/// Decryption for documents stored encrypted at rest. The primitive itself lives outside
/// this crate; export is the only caller.
pub trait DocumentCipher: Send + Sync + 'static {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// Used when no key is configured. Unencrypted collections never reach it.
pub struct NoCipher;

impl DocumentCipher for NoCipher {
    fn decrypt(&self, _ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        Err(CipherError::MissingKey)
    }
}
