//! Append-only text logs for decoded traffic

use anyhow::{Context, Result};
use protocol::TransportError;
use protocol::receive::{DecodeLog, log_entry};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Encrypted and decrypted logs, one space-separated entry per flush
pub struct FileLogs {
    encrypted: File,
    decrypted: File,
}

impl FileLogs {
    pub fn open<P: AsRef<Path>>(encrypted: P, decrypted: P) -> Result<Self> {
        let encrypted_path = encrypted.as_ref().to_path_buf();
        let decrypted_path = decrypted.as_ref().to_path_buf();

        let logs = Self {
            encrypted: open_append(&encrypted_path)?,
            decrypted: open_append(&decrypted_path)?,
        };

        info!(
            "Logging encrypted text to {:?}, decrypted text to {:?}",
            encrypted_path, decrypted_path
        );
        Ok(logs)
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {:?}", path))
}

impl DecodeLog for FileLogs {
    fn record(&mut self, encrypted: &str, decrypted: &str) -> Result<(), TransportError> {
        self.encrypted
            .write_all(log_entry(encrypted).as_bytes())
            .and_then(|_| self.encrypted.flush())
            .map_err(TransportError::Log)?;

        self.decrypted
            .write_all(log_entry(decrypted).as_bytes())
            .and_then(|_| self.decrypted.flush())
            .map_err(TransportError::Log)
    }
}
