//! Terminal utilities for raw mode, terminal size, screen redraws, and key
//! encoding.
//!
//! Wraps crossterm's terminal operations and provides a RAII guard that
//! automatically restores the terminal state on drop.

use std::io::Write;

use anyhow::{Context, Result};
use crossterm::cursor::MoveTo;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{self, Clear, ClearType};

/// RAII guard that restores the terminal to its original mode on drop.
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    /// Enter raw terminal mode.
    ///
    /// Returns a guard that will automatically restore the terminal when dropped.
    pub fn enter() -> Result<Self> {
        terminal::enable_raw_mode().context("failed to enable raw terminal mode")?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        // Nothing useful to do if this fails inside Drop.
        let _ = terminal::disable_raw_mode();
    }
}

/// Get the current terminal size as (columns, rows).
///
/// Falls back to (80, 24) if the size cannot be determined.
pub fn get_terminal_size() -> (u16, u16) {
    terminal::size().unwrap_or((80, 24))
}

/// Clear the screen and home the cursor.
pub fn clear_screen(out: &mut impl Write) -> Result<()> {
    execute!(out, Clear(ClearType::All), MoveTo(0, 0)).context("failed to clear screen")?;
    Ok(())
}

/// Write a `[relay]` status line on its own row. Raw mode needs explicit `\r`.
pub fn status_line(out: &mut impl Write, message: &str) -> Result<()> {
    write!(out, "\r\n[relay] {message}\r\n")?;
    out.flush()?;
    Ok(())
}

/// Convert a crossterm key event to raw bytes suitable for a PTY.
pub fn key_event_to_bytes(event: &KeyEvent) -> Option<Vec<u8>> {
    let alt = event.modifiers.contains(KeyModifiers::ALT);
    let bytes = match event.code {
        KeyCode::Char(c) => {
            if event.modifiers.contains(KeyModifiers::CONTROL) {
                if let Some(byte) = control_byte(c) {
                    return Some(with_alt(alt, vec![byte]));
                }
            }
            let mut buf = [0u8; 4];
            c.encode_utf8(&mut buf).as_bytes().to_vec()
        }
        KeyCode::Enter => vec![b'\r'],
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Tab => vec![b'\t'],
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Esc => vec![0x1b],
        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left => b"\x1b[D".to_vec(),
        KeyCode::Home => b"\x1b[H".to_vec(),
        KeyCode::End => b"\x1b[F".to_vec(),
        KeyCode::PageUp => b"\x1b[5~".to_vec(),
        KeyCode::PageDown => b"\x1b[6~".to_vec(),
        KeyCode::Insert => b"\x1b[2~".to_vec(),
        KeyCode::Delete => b"\x1b[3~".to_vec(),
        KeyCode::F(n) => {
            let seq = match n {
                1 => "\x1bOP",
                2 => "\x1bOQ",
                3 => "\x1bOR",
                4 => "\x1bOS",
                5 => "\x1b[15~",
                6 => "\x1b[17~",
                7 => "\x1b[18~",
                8 => "\x1b[19~",
                9 => "\x1b[20~",
                10 => "\x1b[21~",
                11 => "\x1b[23~",
                12 => "\x1b[24~",
                _ => return None,
            };
            seq.as_bytes().to_vec()
        }
        _ => return None,
    };
    Some(with_alt(alt, bytes))
}

/// Ctrl+A = 0x01 .. Ctrl+Z = 0x1a, then Ctrl+[ \ ] ^ _ = 0x1b..0x1f.
fn control_byte(c: char) -> Option<u8> {
    match c.to_ascii_lowercase() {
        c @ 'a'..='z' => Some(c as u8 - b'a' + 1),
        '@' | ' ' => Some(0x00),
        '[' => Some(0x1b),
        '\\' => Some(0x1c),
        ']' => Some(0x1d),
        '^' => Some(0x1e),
        '_' => Some(0x1f),
        _ => None,
    }
}

fn with_alt(alt: bool, bytes: Vec<u8>) -> Vec<u8> {
    if alt {
        let mut prefixed = Vec::with_capacity(bytes.len() + 1);
        prefixed.push(0x1b);
        prefixed.extend(bytes);
        prefixed
    } else {
        bytes
    }
}
