//! Keyed rotation cipher over the 7-bit symbol domain
//!
//! Every symbol is shifted by the session key modulo 128. This is obfuscation
//! against casual inspection of captured traffic and nothing more: there are only
//! 26 keys and the transform preserves symbol frequencies, so it provides no
//! confidentiality against anyone who looks.
//!
//! Inputs outside the 7-bit domain are rejected with [`CipherError::OutOfDomain`]
//! instead of being folded in with modulo arithmetic.

use crate::constants::{DEFAULT_KEY, MAX_KEY, SYMBOL_DOMAIN};
use crate::error::CipherError;
use std::fmt;

/// One unit of plaintext or ciphertext (0..=127)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u8);

impl Symbol {
    pub const MAX: u8 = (SYMBOL_DOMAIN - 1) as u8;

    pub fn new(value: u8) -> Result<Self, CipherError> {
        if value > Self::MAX {
            return Err(CipherError::OutOfDomain(value as u32));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn as_char(self) -> char {
        char::from(self.0)
    }
}

impl TryFrom<char> for Symbol {
    type Error = CipherError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        if !c.is_ascii() {
            return Err(CipherError::OutOfDomain(c as u32));
        }
        Ok(Self(c as u8))
    }
}

impl TryFrom<u16> for Symbol {
    type Error = CipherError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value >= SYMBOL_DOMAIN {
            return Err(CipherError::OutOfDomain(value as u32));
        }
        Ok(Self(value as u8))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char().escape_default())
    }
}

/// Session key (0..=25), shared out of band and never transmitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key(u8);

impl Key {
    pub fn new(value: u8) -> Result<Self, CipherError> {
        if value > MAX_KEY {
            return Err(CipherError::InvalidKey(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Key {
    fn default() -> Self {
        Self(DEFAULT_KEY)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rotate a symbol forward by the key
pub fn encrypt(symbol: Symbol, key: Key) -> Symbol {
    let rotated = (symbol.0 as u16 + key.0 as u16) % SYMBOL_DOMAIN;
    Symbol(rotated as u8)
}

/// Rotate a symbol back by the key
pub fn decrypt(symbol: Symbol, key: Key) -> Symbol {
    let shift = key.0 as u16 % SYMBOL_DOMAIN;
    let rotated = (symbol.0 as u16 + SYMBOL_DOMAIN - shift) % SYMBOL_DOMAIN;
    Symbol(rotated as u8)
}

/// Encrypt every character of `text`
///
/// # Returns
/// * `Ok(String)` - Rotated text, same length as the input
/// * `Err(CipherError)` - First character outside the 7-bit domain
pub fn encrypt_str(text: &str, key: Key) -> Result<String, CipherError> {
    text.chars()
        .map(|c| Symbol::try_from(c).map(|s| encrypt(s, key).as_char()))
        .collect()
}

/// Decrypt every character of `text`
pub fn decrypt_str(text: &str, key: Key) -> Result<String, CipherError> {
    text.chars()
        .map(|c| Symbol::try_from(c).map(|s| decrypt(s, key).as_char()))
        .collect()
}
