//! Terminal keyboard source

use crate::output;
use crossterm::event::{
    self, Event, KeyCode as TermKeyCode, KeyEvent as TermKeyEvent, KeyEventKind,
    KeyModifiers, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::{execute, terminal};
use protocol::StopToken;
use protocol::TransportError;
use protocol::transmit::{KeyCode, KeyEvent};
use std::io;
use std::time::Duration;
use tracing::debug;

/// Blocking stream of key events read from the controlling terminal
///
/// The terminal stays in raw mode until this value is dropped. Terminals that
/// cannot report key releases deliver one event per keystroke; those are surfaced
/// as releases so every keystroke still produces exactly one release.
pub struct TerminalKeys {
    stop: StopToken,
    poll_interval: Duration,
    reports_release: bool,
    enhanced: bool,
}

impl TerminalKeys {
    pub fn open(stop: StopToken, poll_interval: Duration) -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        output::set_raw_mode(true);

        // From here on an early return drops the guard and restores the terminal
        let mut keys = Self::guard(stop, poll_interval);
        if !cfg!(windows) && terminal::supports_keyboard_enhancement().unwrap_or(false) {
            execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
            keys.enhanced = true;
            keys.reports_release = true;
        }

        debug!(reports_release = keys.reports_release, "Keyboard opened in raw mode");
        Ok(keys)
    }

    fn guard(stop: StopToken, poll_interval: Duration) -> Self {
        Self {
            stop,
            poll_interval,
            reports_release: cfg!(windows),
            enhanced: false,
        }
    }

    fn translate(&self, key: TermKeyEvent) -> Option<KeyEvent> {
        let code = translate_code(key.code, key.modifiers);
        match (key.kind, self.reports_release) {
            (KeyEventKind::Press, true) => Some(KeyEvent::Pressed(code)),
            (KeyEventKind::Release, true) => Some(KeyEvent::Released(code)),
            (KeyEventKind::Press, false) => Some(KeyEvent::Released(code)),
            _ => None,
        }
    }
}

impl Iterator for TerminalKeys {
    type Item = Result<KeyEvent, TransportError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.stop.is_cancelled() {
                return None;
            }

            match event::poll(self.poll_interval) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => return Some(Err(TransportError::Keyboard(e))),
            }

            match event::read() {
                Ok(Event::Key(key)) => {
                    if let Some(event) = self.translate(key) {
                        return Some(Ok(event));
                    }
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::Keyboard(e))),
            }
        }
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        }
        let _ = terminal::disable_raw_mode();
        output::set_raw_mode(false);
    }
}

/// Map a terminal key to the transmit path's key identity
///
/// Ctrl-C is treated as escape because raw mode swallows the interrupt signal.
/// Other Ctrl or Alt chords are special keys and never reach the wire.
fn translate_code(code: TermKeyCode, modifiers: KeyModifiers) -> KeyCode {
    let chord = KeyModifiers::CONTROL | KeyModifiers::ALT;
    // AltGr arrives as Ctrl+Alt together with the composed character
    let chorded = modifiers.intersects(chord) && !modifiers.contains(chord);

    match code {
        TermKeyCode::Esc => KeyCode::Escape,
        TermKeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => KeyCode::Escape,
        TermKeyCode::Char(c) if chorded => KeyCode::Special(format!("{:?}+{}", modifiers, c)),
        TermKeyCode::Char(c) => KeyCode::Char(c),
        other => KeyCode::Special(format!("{:?}", other)),
    }
}
