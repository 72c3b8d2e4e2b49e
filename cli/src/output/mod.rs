//! Console output for the operator

use protocol::TransportError;
use protocol::receive::DecodeLog;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

/// Set while the keyboard holds the terminal in raw mode
static RAW_MODE: AtomicBool = AtomicBool::new(false);

pub fn set_raw_mode(enabled: bool) {
    RAW_MODE.store(enabled, Ordering::SeqCst);
}

pub fn raw_mode() -> bool {
    RAW_MODE.load(Ordering::SeqCst)
}

/// Serializes tests that flip the process-wide raw mode flag
#[cfg(test)]
pub static RAW_MODE_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Writer for diagnostics that stays readable while the terminal is in raw mode
///
/// Raw mode disables the newline to carriage-return translation, so lines are
/// rewritten with an explicit `\r\n` while it is active.
pub struct ConsoleWriter<W> {
    inner: W,
}

impl ConsoleWriter<io::Stderr> {
    pub fn stderr() -> Self {
        Self { inner: io::stderr() }
    }
}

impl<W: Write> Write for ConsoleWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !raw_mode() || !buf.contains(&b'\n') {
            return self.inner.write(buf);
        }

        let mut translated = Vec::with_capacity(buf.len() + 8);
        for &byte in buf {
            if byte == b'\n' {
                translated.push(b'\r');
            }
            translated.push(byte);
        }
        self.inner.write_all(&translated)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Prints every decoded entry before handing it to the wrapped log
pub struct ConsoleEcho<L> {
    inner: L,
}

impl<L> ConsoleEcho<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }
}

impl<L: DecodeLog> DecodeLog for ConsoleEcho<L> {
    fn record(&mut self, encrypted: &str, decrypted: &str) -> Result<(), TransportError> {
        println!(
            "[{}] {} -> {}",
            chrono::Local::now().format("%H:%M:%S"),
            encrypted.escape_debug(),
            decrypted.escape_debug()
        );
        self.inner.record(encrypted, decrypted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(raw: bool, text: &str) -> String {
        let _lock = RAW_MODE_TEST_LOCK.lock().unwrap();
        set_raw_mode(raw);

        let mut writer = ConsoleWriter { inner: Vec::new() };
        let result = writer.write(text.as_bytes());
        set_raw_mode(false);

        assert_eq!(result.unwrap(), text.len());
        String::from_utf8(writer.inner).unwrap()
    }

    #[test]
    fn test_raw_mode_writes_carriage_returns() {
        assert_eq!(written(true, "one\ntwo\n"), "one\r\ntwo\r\n");
        assert_eq!(written(true, "no newline"), "no newline");
    }

    #[test]
    fn test_cooked_mode_passes_through() {
        assert_eq!(written(false, "one\ntwo\n"), "one\ntwo\n");
    }
}
