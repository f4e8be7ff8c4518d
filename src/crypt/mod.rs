//! Decryption context for columns that hold encrypted credentials.
//!
//! A credential blob decrypts to a JSON object of named secrets
//! (`{"password": "...", "private_key": "..."}`). The plaintext of the
//! last blob is kept so that reading several fields of the same row costs
//! one decryption; `flush` scrubs it.

use std::collections::HashMap;

use tracing::trace;

use crate::core::SqlError;

/// Turns stored ciphertext into plaintext bytes.
pub trait Cipher {
    fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, SqlError>;
}

impl<F> Cipher for F
where
    F: Fn(&str) -> Result<Vec<u8>, SqlError>,
{
    fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, SqlError> {
        self(ciphertext)
    }
}

struct Plaintext {
    ciphertext: String,
    fields: HashMap<String, String>,
}

fn scrub(value: &mut String) {
    let mut bytes = std::mem::take(value).into_bytes();
    bytes.fill(0);
    std::hint::black_box(&bytes);
}

impl Drop for Plaintext {
    fn drop(&mut self) {
        for value in self.fields.values_mut() {
            scrub(value);
        }
    }
}

pub struct CryptContext {
    cipher: Box<dyn Cipher>,
    cache: Option<Plaintext>,
}

impl CryptContext {
    pub fn new(cipher: impl Cipher + 'static) -> Self {
        Self {
            cipher: Box::new(cipher),
            cache: None,
        }
    }

    /// The field `name` of the credential blob `ciphertext`.
    pub fn decrypt(&mut self, ciphertext: &str, name: &str) -> Result<Option<String>, SqlError> {
        let cached = self
            .cache
            .as_ref()
            .is_some_and(|plain| plain.ciphertext == ciphertext);
        if !cached {
            self.flush();
            let mut bytes = self.cipher.decrypt(ciphertext)?;
            let fields = serde_json::from_slice::<HashMap<String, String>>(&bytes)
                .map_err(|err| SqlError::Crypt(format!("malformed plaintext: {err}")));
            bytes.fill(0);
            self.cache = Some(Plaintext {
                ciphertext: ciphertext.to_string(),
                fields: fields?,
            });
            trace!("decrypted credential blob");
        }
        Ok(self
            .cache
            .as_ref()
            .and_then(|plain| plain.fields.get(name).cloned()))
    }

    /// Drop the buffered plaintext.
    pub fn flush(&mut self) {
        self.cache = None;
    }

    #[must_use]
    pub const fn has_plaintext(&self) -> bool {
        self.cache.is_some()
    }
}
