//! Session registry: which sessions exist and which one is focused.
//!
//! Pure in-memory state with no I/O. Records keep insertion order so tabs
//! render predictably. Focus is a single `active_id` pointer that is always
//! either absent or the id of a live record.

use relay_core::error::{RelayError, RelayResult};
use tracing::debug;
use uuid::Uuid;

/// One open session (tab).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Client-generated session id, also sent to the host.
    pub id: String,
    /// Host this session is bound to.
    pub host_id: String,
    /// Tab label; defaults to the host id.
    pub display_name: String,
}

/// Owner of all session records.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<SessionRecord>,
    active_id: Option<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session for `host_id` and focus it. Returns the new session id.
    pub fn create_session(&mut self, host_id: &str, display_name: Option<String>) -> String {
        let id = self.fresh_id();
        let display_name = display_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| host_id.to_string());

        self.sessions.push(SessionRecord {
            id: id.clone(),
            host_id: host_id.to_string(),
            display_name,
        });
        self.active_id = Some(id.clone());
        debug!(session_id = %id, host_id, "session created");

        self.check_invariant();
        id
    }

    /// Remove a session. Unknown ids are ignored.
    ///
    /// Removing the focused session moves focus to the first remaining record,
    /// or clears it when none remain.
    pub fn remove_session(&mut self, session_id: &str) -> Option<SessionRecord> {
        let pos = self.position(session_id)?;
        let removed = self.sessions.remove(pos);

        if self.active_id.as_deref() == Some(session_id) {
            self.active_id = self.sessions.first().map(|s| s.id.clone());
        }
        debug!(session_id, active = ?self.active_id, "session removed");

        self.check_invariant();
        Some(removed)
    }

    /// Focus an existing session.
    pub fn set_active(&mut self, session_id: &str) -> RelayResult<()> {
        if self.position(session_id).is_none() {
            return Err(RelayError::InvalidReference(session_id.to_string()));
        }
        self.active_id = Some(session_id.to_string());
        self.check_invariant();
        Ok(())
    }

    /// All sessions in insertion order.
    pub fn list_sessions(&self) -> &[SessionRecord] {
        &self.sessions
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active(&self) -> Option<&SessionRecord> {
        self.active_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.active_id.as_deref() == Some(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionRecord> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.position(session_id).is_some()
    }

    /// Index of a session in tab order.
    pub fn position(&self, session_id: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.id == session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.contains(&id) {
                return id;
            }
        }
    }

    fn check_invariant(&self) {
        debug_assert!(
            self.active_id.as_deref().map_or(true, |id| self.contains(id)),
            "active session id does not resolve to a record"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invariant_holds(reg: &SessionRegistry) -> bool {
        match reg.active_id() {
            None => true,
            Some(id) => reg.contains(id),
        }
    }

    #[test]
    fn create_focuses_new_session() {
        let mut reg = SessionRegistry::new();
        let a = reg.create_session("h1", None);
        let b = reg.create_session("h2", Some("build box".into()));

        assert_eq!(reg.active_id(), Some(b.as_str()));
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);

        let names: Vec<_> = reg.list_sessions().iter().map(|s| s.display_name.as_str()).collect();
        assert_eq!(names, ["h1", "build box"]);
    }

    #[test]
    fn remove_active_promotes_next_remaining() {
        let mut reg = SessionRegistry::new();
        let a = reg.create_session("h1", None);
        let b = reg.create_session("h2", None);
        reg.set_active(&a).unwrap();

        reg.remove_session(&a);

        let ids: Vec<_> = reg.list_sessions().iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![b.clone()]);
        assert_eq!(reg.active_id(), Some(b.as_str()));
    }

    #[test]
    fn remove_last_clears_focus() {
        let mut reg = SessionRegistry::new();
        let a = reg.create_session("h1", None);
        assert!(reg.remove_session(&a).is_some());
        assert!(reg.is_empty());
        assert_eq!(reg.active_id(), None);
    }

    #[test]
    fn remove_inactive_keeps_focus() {
        let mut reg = SessionRegistry::new();
        let a = reg.create_session("h1", None);
        let b = reg.create_session("h2", None);
        reg.remove_session(&a);
        assert_eq!(reg.active_id(), Some(b.as_str()));
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut reg = SessionRegistry::new();
        assert!(reg.remove_session("x").is_none());
        assert!(reg.remove_session("x").is_none());
        assert!(reg.is_empty());
        assert_eq!(reg.active_id(), None);

        let a = reg.create_session("h1", None);
        reg.remove_session("x");
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.active_id(), Some(a.as_str()));
    }

    #[test]
    fn set_active_unknown_is_invalid_reference() {
        let mut reg = SessionRegistry::new();
        let a = reg.create_session("h1", None);
        let _b = reg.create_session("h2", None);
        reg.set_active(&a).unwrap();
        let before = reg.list_sessions().to_vec();

        let err = reg.set_active("missing").unwrap_err();
        assert!(matches!(err, RelayError::InvalidReference(ref id) if id == "missing"));
        assert_eq!(reg.list_sessions(), before.as_slice());
        assert_eq!(reg.active_id(), Some(a.as_str()));
    }

    #[test]
    fn list_order_is_stable() {
        let mut reg = SessionRegistry::new();
        let ids: Vec<_> = (0..5).map(|i| reg.create_session(&format!("h{i}"), None)).collect();
        reg.set_active(&ids[2]).unwrap();
        let first: Vec<_> = reg.list_sessions().iter().map(|s| s.id.clone()).collect();
        let second: Vec<_> = reg.list_sessions().iter().map(|s| s.id.clone()).collect();
        assert_eq!(first, ids);
        assert_eq!(first, second);
    }

    #[test]
    fn invariant_survives_mixed_operations() {
        let mut reg = SessionRegistry::new();
        let mut known: Vec<String> = Vec::new();
        // Small LCG so the sequence is deterministic.
        let mut seed: u32 = 0x2545_f491;
        let mut next = move || {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            seed >> 16
        };

        for step in 0..500 {
            match next() % 4 {
                0 | 1 => known.push(reg.create_session(&format!("h{step}"), None)),
                2 => {
                    let id = if known.is_empty() || next() % 5 == 0 {
                        "stale".to_string()
                    } else {
                        known.remove(next() as usize % known.len())
                    };
                    reg.remove_session(&id);
                }
                _ => {
                    if !known.is_empty() {
                        let id = known[next() as usize % known.len()].clone();
                        reg.set_active(&id).unwrap();
                    }
                }
            }
            assert!(invariant_holds(&reg), "invariant broken at step {step}");
            assert_eq!(reg.len(), known.len());
            assert_eq!(reg.active_id().is_none(), reg.is_empty());
        }
    }
}
