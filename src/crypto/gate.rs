//! Password supply and key derivation for one session.

use super::{DEFAULT_KEY_CACHE_SIZE, DerivedKeys, KeyCache, Password};
use crate::callback::CallbackContext;
use crate::format::SALT_SIZE;
use crate::format::header::PasswordCheck;
use crate::{Error, Result};

/// Hands out keys for encrypted headers and entries.
///
/// The password comes from the session or, failing that, from the
/// password callback. A password obtained from the callback is kept for
/// the rest of the session.
pub(crate) struct CryptoGate {
    password: Option<Password>,
    keys: KeyCache,
    max_lg2: u8,
}

impl std::fmt::Debug for CryptoGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoGate")
            .field("has_password", &self.password.is_some())
            .field("keys", &self.keys)
            .field("max_lg2", &self.max_lg2)
            .finish()
    }
}

impl CryptoGate {
    pub(crate) fn new(password: Option<Password>, max_lg2: u8) -> Self {
        Self {
            password,
            keys: KeyCache::new(DEFAULT_KEY_CACHE_SIZE),
            max_lg2,
        }
    }

    pub(crate) fn set_password(&mut self, password: Password) {
        self.password = Some(password);
    }

    #[cfg(test)]
    pub(crate) fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Returns the session password, asking the callback if none is set.
    pub(crate) fn password(
        &mut self,
        callbacks: &CallbackContext,
        entry: Option<&str>,
    ) -> Result<Password> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }
        match callbacks.need_password(entry) {
            Some(password) => {
                log::debug!("password supplied by callback");
                self.password = Some(password.clone());
                Ok(password)
            }
            None => Err(Error::PasswordRequired {
                entry: entry.map(str::to_string),
            }),
        }
    }

    /// Derives keys and checks them against `check` when one is usable.
    ///
    /// `entry` names the entry for error reporting (`None` for headers).
    pub(crate) fn unlock(
        &mut self,
        callbacks: &CallbackContext,
        entry: Option<&str>,
        salt: &[u8; SALT_SIZE],
        lg2_count: u8,
        check: Option<&PasswordCheck>,
    ) -> Result<DerivedKeys> {
        let password = self.password(callbacks, entry)?;
        let keys = self.keys.derive(&password, salt, lg2_count, self.max_lg2)?;
        match check.filter(|c| c.is_consistent()) {
            Some(check) if !keys.matches(check) => Err(Error::WrongPassword {
                entry: entry.map(str::to_string),
            }),
            _ => Ok(keys),
        }
    }
}
