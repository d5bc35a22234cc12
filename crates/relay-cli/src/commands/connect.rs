//! `relay connect <host>...`: interactive multi-tab terminal.
//!
//! Opens one session per host through a `SessionOrchestrator`, enters raw
//! terminal mode, and pipes keystrokes to the focused tab. Output of
//! background tabs keeps arriving and is replayed when the tab is focused.
//! Terminal resizes are forwarded to every session.
//!
//! Tab commands follow the prefix key `Ctrl+]`:
//! `n` next, `p` previous, `1`-`9` select, `x` close, `q` quit,
//! `]` sends a literal `Ctrl+]`.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use relay_client::{
    ConnectConfig, OrchestratorConfig, SessionEvent, SessionEventKind, SessionOrchestrator,
    SessionStatus, WebSocketConnector,
};

use crate::terminal as term;

/// Byte sent for a literal `Ctrl+]`.
const PREFIX_BYTE: u8 = 0x1d;

/// Everything `relay connect` needs, already merged from flags and config.
pub struct ConnectArgs {
    pub hosts: Vec<String>,
    pub name: Option<String>,
    pub connect: ConnectConfig,
    pub orchestrator: OrchestratorConfig,
}

/// What a key press means for the tab UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabAction {
    Input(Vec<u8>),
    Next,
    Prev,
    /// Zero-based tab index.
    Select(usize),
    CloseTab,
    Quit,
}

/// Splits key presses into session input and prefixed tab commands.
#[derive(Debug, Default)]
pub struct KeyRouter {
    armed: bool,
}

impl KeyRouter {
    pub fn route(&mut self, key: &KeyEvent) -> Option<TabAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        if !self.armed {
            if is_prefix(key) {
                self.armed = true;
                return None;
            }
            return term::key_event_to_bytes(key).map(TabAction::Input);
        }

        self.armed = false;
        if is_prefix(key) {
            return Some(TabAction::Input(vec![PREFIX_BYTE]));
        }
        match key.code {
            KeyCode::Char('n') => Some(TabAction::Next),
            KeyCode::Char('p') => Some(TabAction::Prev),
            KeyCode::Char('x') => Some(TabAction::CloseTab),
            KeyCode::Char('q') => Some(TabAction::Quit),
            KeyCode::Char(']') => Some(TabAction::Input(vec![PREFIX_BYTE])),
            KeyCode::Char(c @ '1'..='9') => Some(TabAction::Select(c as usize - '1' as usize)),
            other => {
                debug!(?other, "unbound tab command");
                None
            }
        }
    }
}

fn is_prefix(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char(']')
}

/// Run the interactive session UI until every tab is closed or the user quits.
pub async fn run(args: ConnectArgs) -> Result<()> {
    if args.hosts.is_empty() {
        anyhow::bail!("no host given");
    }

    let connector = Arc::new(WebSocketConnector::new(args.connect));
    let mut orch = SessionOrchestrator::new(connector, args.orchestrator);

    let (cols, rows) = term::get_terminal_size();
    info!(cols, rows, "terminal size");
    orch.resize(rows, cols);

    let mut first = None;
    for (i, host) in args.hosts.iter().enumerate() {
        let name = args.name.as_ref().map(|n| {
            if args.hosts.len() > 1 {
                format!("{n}-{}", i + 1)
            } else {
                n.clone()
            }
        });
        let id = orch
            .open_session(host, name)
            .with_context(|| format!("cannot open a session to '{host}'"))?;
        first.get_or_insert(id);
    }
    if let Some(id) = &first {
        orch.focus(id)?;
    }

    let guard = term::RawModeGuard::enter().context("failed to enter raw terminal mode")?;
    let mut stdout = std::io::stdout();
    redraw(&orch, &mut stdout)?;

    // crossterm reads block, so they live on their own thread. Polling lets
    // the thread notice when the receiver is gone.
    let (tx_events, mut rx_events) = mpsc::channel::<Event>(64);
    let input_handle = tokio::task::spawn_blocking(move || {
        while !tx_events.is_closed() {
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => match event::read() {
                    Ok(ev) => {
                        if tx_events.blocking_send(ev).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("crossterm event error: {e}");
                        break;
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    warn!("crossterm poll error: {e}");
                    break;
                }
            }
        }
    });

    let mut router = KeyRouter::default();
    let mut running = true;
    while running && !orch.registry().is_empty() {
        tokio::select! {
            event = orch.next_event() => match event {
                Some(event) => render_event(&orch, &mut stdout, event)?,
                None => running = false,
            },
            input = rx_events.recv() => match input {
                Some(Event::Key(key)) => {
                    if let Some(action) = router.route(&key) {
                        running = apply(&mut orch, &mut stdout, action).await?;
                    }
                }
                Some(Event::Resize(cols, rows)) => {
                    debug!(cols, rows, "terminal resized");
                    orch.resize(rows, cols);
                }
                Some(_) => {}
                None => running = false,
            },
        }
    }

    drop(rx_events);
    orch.shutdown().await;
    let _ = input_handle.await;
    drop(guard);

    info!("all sessions closed");
    eprintln!("\r\nrelay: all sessions closed.");
    Ok(())
}

/// Carry out a tab action. Returns `false` when the UI should exit.
async fn apply(orch: &mut SessionOrchestrator, out: &mut impl Write, action: TabAction) -> Result<bool> {
    match action {
        TabAction::Input(bytes) => orch.send_input(&bytes),
        TabAction::Next => {
            orch.focus_relative(1);
            redraw(orch, out)?;
        }
        TabAction::Prev => {
            orch.focus_relative(-1);
            redraw(orch, out)?;
        }
        TabAction::Select(index) => {
            let target = orch.registry().list_sessions().get(index).map(|r| r.id.clone());
            match target {
                Some(id) => {
                    orch.focus(&id)?;
                    redraw(orch, out)?;
                }
                None => term::status_line(out, &format!("no tab {}", index + 1))?,
            }
        }
        TabAction::CloseTab => {
            if let Some(id) = orch.active().map(|r| r.id.clone()) {
                orch.close_session(&id).await;
            }
            if orch.registry().is_empty() {
                return Ok(false);
            }
            redraw(orch, out)?;
        }
        TabAction::Quit => return Ok(false),
    }
    Ok(true)
}

/// Clear the screen and replay the focused tab.
fn redraw(orch: &SessionOrchestrator, out: &mut impl Write) -> Result<()> {
    let Some(active) = orch.active() else {
        return Ok(());
    };
    term::clear_screen(out)?;
    let total = orch.registry().len();
    let position = orch.registry().position(&active.id).map_or(0, |p| p + 1);
    let mut banner = format!("tab {position}/{total}: {}", tab_name(orch, &active.id));
    if let Some(status) = orch.status(&active.id).and_then(describe) {
        banner.push_str(&format!(" ({status})"));
    }
    term::status_line(out, &banner)?;

    if let Some(scrollback) = orch.scrollback(&active.id) {
        out.write_all(&scrollback)?;
    }
    out.flush()?;
    Ok(())
}

fn render_event(orch: &SessionOrchestrator, out: &mut impl Write, event: SessionEvent) -> Result<()> {
    let active = orch.is_active(&event.session_id);
    match event.kind {
        SessionEventKind::Output(bytes) => {
            if active {
                out.write_all(&bytes)?;
                out.flush()?;
            }
        }
        SessionEventKind::Error(message) => {
            notice(orch, out, &event.session_id, active, &format!("error: {message}"))?;
        }
        SessionEventKind::Status(status) => {
            if let Some(text) = describe(&status) {
                notice(orch, out, &event.session_id, active, &text)?;
            }
        }
    }
    Ok(())
}

fn notice(orch: &SessionOrchestrator, out: &mut impl Write, id: &str, active: bool, text: &str) -> Result<()> {
    if active {
        term::status_line(out, text)
    } else {
        term::status_line(out, &format!("{}: {text}", tab_name(orch, id)))
    }
}

fn tab_name(orch: &SessionOrchestrator, id: &str) -> String {
    orch.registry()
        .get(id)
        .map(|r| r.display_name.clone())
        .unwrap_or_else(|| id.to_string())
}

/// User-facing text for statuses worth a notice.
fn describe(status: &SessionStatus) -> Option<String> {
    match status {
        SessionStatus::Connecting | SessionStatus::Connected => None,
        SessionStatus::Failed(reason) => Some(format!("connection failed: {reason}")),
        SessionStatus::Ended { exit_code: Some(code) } => Some(format!("process exited (code {code})")),
        SessionStatus::Ended { exit_code: None } => Some("process exited".to_string()),
        SessionStatus::Disconnected => Some("connection lost".to_string()),
    }
}
