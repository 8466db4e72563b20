//! Process-local store of sessions, their targets and their channel bindings.
//!
//! Concurrency discipline: the session map is a sharded [`DashMap`], and each
//! session's mutable state sits behind its own [`Mutex`]. Every operation
//! touches at most one session and holds that lock only for the duration of
//! the mutation (never across an `.await`), so operations on one session are
//! atomic and ordered while different sessions never contend.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::address::Addressing;
use crate::channel::FrameSink;
use crate::errors::RegistryError;
use crate::ids::{BindingId, SessionId};
use crate::target::{Announcement, Target};

struct DataBinding {
    id: BindingId,
    channel: Weak<dyn FrameSink>,
}

#[derive(Default)]
struct SessionState {
    targets: Vec<Target>,
    data: Option<DataBinding>,
    /// Set under the lock by `destroy_session`; a handle cloned out of the
    /// map before removal must not accept new state afterwards.
    destroyed: bool,
}

/// One live session. Exists exactly as long as its control channel.
struct Session {
    created_at: Instant,
    started_at: DateTime<Utc>,
    control: Arc<dyn FrameSink>,
    state: Mutex<SessionState>,
}

/// Result of binding a data channel.
pub struct BindOutcome {
    /// Id of the new binding; required to unbind it later.
    pub binding: BindingId,
    /// Previously bound channel that was displaced, if it is still alive.
    pub replaced: Option<Arc<dyn FrameSink>>,
}

impl BindOutcome {
    /// Whether a previous binding was replaced.
    pub fn replaced_previous(&self) -> bool {
        self.replaced.is_some()
    }
}

/// What remains of a session after [`SessionRegistry::destroy_session`].
pub struct EndedSession {
    /// Id of the destroyed session.
    pub id: SessionId,
    /// Wall-clock creation time.
    pub started_at: DateTime<Utc>,
    /// How long the session lived.
    pub duration: Duration,
    /// Number of targets it had announced.
    pub target_count: usize,
    /// The data channel that was bound at teardown, if still alive.
    pub data_channel: Option<Arc<dyn FrameSink>>,
}

/// Live counts for the stats endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Live sessions.
    pub sessions: usize,
    /// Connected control channels (one per session).
    pub sockets: usize,
    /// Targets across all sessions.
    pub targets: usize,
    /// Sessions with a bound, still-alive data channel.
    pub bindings: usize,
}

/// Registry of all live sessions.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    addressing: Addressing,
}

impl SessionRegistry {
    /// Create an empty registry that derives target URLs from `addressing`.
    pub fn new(addressing: Addressing) -> Self {
        Self {
            sessions: DashMap::new(),
            addressing,
        }
    }

    /// Addressing used for derived target URLs.
    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    /// Create a session owned by `control` and return its fresh id.
    pub fn create_session(&self, control: Arc<dyn FrameSink>) -> SessionId {
        let id = SessionId::new();
        let session = Arc::new(Session {
            created_at: Instant::now(),
            started_at: Utc::now(),
            control,
            state: Mutex::new(SessionState::default()),
        });
        let _ = self.sessions.insert(id.clone(), session);
        debug!(session_id = %id, "session created");
        id
    }

    fn get(&self, session_id: &SessionId) -> Result<Arc<Session>, RegistryError> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::UnknownSession(session_id.clone()))
    }

    /// Whether the session is live.
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Append a target to the session and return it.
    pub fn add_target(
        &self,
        session_id: &SessionId,
        announcement: Announcement,
    ) -> Result<Target, RegistryError> {
        let session = self.get(session_id)?;
        let target = Target::new(session_id, announcement, &self.addressing);
        let mut state = session.state.lock();
        if state.destroyed {
            return Err(RegistryError::UnknownSession(session_id.clone()));
        }
        state.targets.push(target.clone());
        drop(state);
        debug!(session_id = %session_id, target_id = %target.id, "target added");
        Ok(target)
    }

    /// Targets of a session in announcement order; empty if unknown.
    pub fn list_targets(&self, session_id: &SessionId) -> Vec<Target> {
        self.get(session_id)
            .map(|session| session.state.lock().targets.clone())
            .unwrap_or_default()
    }

    /// Bind `channel` as the session's data channel.
    ///
    /// The registry only keeps a weak reference. A displaced channel is
    /// returned in [`BindOutcome::replaced`] for the caller to close.
    pub fn bind_data_channel(
        &self,
        session_id: &SessionId,
        channel: &Arc<dyn FrameSink>,
    ) -> Result<BindOutcome, RegistryError> {
        let session = self.get(session_id)?;
        let binding = BindingId::new();
        let mut state = session.state.lock();
        if state.destroyed {
            return Err(RegistryError::UnknownSession(session_id.clone()));
        }
        let previous = state.data.replace(DataBinding {
            id: binding.clone(),
            channel: Arc::downgrade(channel),
        });
        drop(state);
        let replaced = previous.and_then(|b| b.channel.upgrade());
        debug!(
            session_id = %session_id,
            binding = %binding,
            replaced = replaced.is_some(),
            "data channel bound"
        );
        Ok(BindOutcome { binding, replaced })
    }

    /// Remove a data-channel binding if it is still the current one.
    ///
    /// Returns `true` if the binding was removed. A stale binding id (the
    /// channel was already replaced, or the session is gone) is a no-op.
    pub fn unbind_data_channel(&self, session_id: &SessionId, binding: &BindingId) -> bool {
        let Ok(session) = self.get(session_id) else {
            return false;
        };
        let mut state = session.state.lock();
        if state.data.as_ref().is_some_and(|b| &b.id == binding) {
            state.data = None;
            debug!(session_id = %session_id, binding = %binding, "data channel unbound");
            true
        } else {
            false
        }
    }

    /// Currently bound data channel, if any and still alive.
    pub fn data_channel(&self, session_id: &SessionId) -> Option<Arc<dyn FrameSink>> {
        let session = self.get(session_id).ok()?;
        let state = session.state.lock();
        state.data.as_ref().and_then(|b| b.channel.upgrade())
    }

    /// The session's control channel.
    pub fn control_channel(&self, session_id: &SessionId) -> Option<Arc<dyn FrameSink>> {
        self.get(session_id)
            .ok()
            .map(|session| Arc::clone(&session.control))
    }

    /// Remove the session with its targets and binding. Idempotent.
    pub fn destroy_session(&self, session_id: &SessionId) -> Option<EndedSession> {
        let (id, session) = self.sessions.remove(session_id)?;
        let mut state = session.state.lock();
        state.destroyed = true;
        let data_channel = state.data.take().and_then(|b| b.channel.upgrade());
        let target_count = state.targets.len();
        state.targets.clear();
        drop(state);
        debug!(session_id = %id, target_count, "session destroyed");
        Some(EndedSession {
            id,
            started_at: session.started_at,
            duration: session.created_at.elapsed(),
            target_count,
            data_channel,
        })
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of live counts.
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for entry in &self.sessions {
            let state = entry.value().state.lock();
            stats.sessions += 1;
            stats.sockets += 1;
            stats.targets += state.targets.len();
            if state
                .data
                .as_ref()
                .is_some_and(|b| b.channel.strong_count() > 0)
            {
                stats.bindings += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::RecordingSink;
    use std::collections::HashSet;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Addressing::localhost(8000))
    }

    fn sink(id: &str) -> Arc<dyn FrameSink> {
        RecordingSink::new(id)
    }

    fn hello(title: &str) -> Announcement {
        Announcement {
            title: title.into(),
            url: "http://example.com".into(),
        }
    }

    #[test]
    fn new_session_has_no_targets() {
        let reg = registry();
        let sid = reg.create_session(sink("c1"));
        assert!(reg.contains(&sid));
        assert!(reg.list_targets(&sid).is_empty());
    }

    #[test]
    fn add_target_appends_in_order() {
        let reg = registry();
        let sid = reg.create_session(sink("c1"));
        let a = reg.add_target(&sid, hello("Tab1")).unwrap();
        let b = reg.add_target(&sid, hello("Tab2")).unwrap();
        let targets = reg.list_targets(&sid);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0], a);
        assert_eq!(targets[1], b);
        assert_eq!(targets[0].title, "Tab1");
        assert!(
            targets[0]
                .web_socket_debugger_url
                .ends_with(&format!("/devtools/page/{sid}"))
        );
    }

    #[test]
    fn add_target_unknown_session() {
        let reg = registry();
        let err = reg
            .add_target(&SessionId::from_raw("nope"), hello("x"))
            .unwrap_err();
        assert_eq!(err, RegistryError::UnknownSession(SessionId::from_raw("nope")));
    }

    #[test]
    fn list_targets_unknown_session_is_empty() {
        let reg = registry();
        assert!(reg.list_targets(&SessionId::from_raw("nope")).is_empty());
    }

    #[test]
    fn target_ids_disjoint_from_session_ids() {
        let reg = registry();
        let mut session_ids = HashSet::new();
        let mut target_ids = HashSet::new();
        for _ in 0..20 {
            let sid = reg.create_session(sink("c"));
            for _ in 0..3 {
                let t = reg.add_target(&sid, hello("t")).unwrap();
                assert!(target_ids.insert(t.id.to_string()));
            }
            assert!(session_ids.insert(sid.to_string()));
        }
        assert!(session_ids.is_disjoint(&target_ids));
    }

    #[test]
    fn bind_unknown_session() {
        let reg = registry();
        let data = sink("d1");
        assert!(reg.bind_data_channel(&SessionId::from_raw("nope"), &data).is_err());
    }

    #[test]
    fn bind_and_replace() {
        let reg = registry();
        let sid = reg.create_session(sink("c1"));
        let first = sink("d1");
        let second = sink("d2");

        let outcome = reg.bind_data_channel(&sid, &first).unwrap();
        assert!(!outcome.replaced_previous());

        let outcome = reg.bind_data_channel(&sid, &second).unwrap();
        assert!(outcome.replaced_previous());
        assert_eq!(outcome.replaced.unwrap().id(), "d1");
        assert_eq!(reg.data_channel(&sid).unwrap().id(), "d2");
    }

    #[test]
    fn registry_holds_data_channel_weakly() {
        let reg = registry();
        let sid = reg.create_session(sink("c1"));
        let data = sink("d1");
        let _ = reg.bind_data_channel(&sid, &data).unwrap();
        assert_eq!(reg.stats().bindings, 1);
        drop(data);
        assert!(reg.data_channel(&sid).is_none());
        assert_eq!(reg.stats().bindings, 0);
    }

    #[test]
    fn stale_unbind_keeps_newer_binding() {
        let reg = registry();
        let sid = reg.create_session(sink("c1"));
        let first = sink("d1");
        let second = sink("d2");
        let old = reg.bind_data_channel(&sid, &first).unwrap().binding;
        let new = reg.bind_data_channel(&sid, &second).unwrap().binding;

        assert!(!reg.unbind_data_channel(&sid, &old));
        assert_eq!(reg.data_channel(&sid).unwrap().id(), "d2");
        assert!(reg.unbind_data_channel(&sid, &new));
        assert!(reg.data_channel(&sid).is_none());
    }

    #[test]
    fn unbind_keeps_session_alive() {
        let reg = registry();
        let sid = reg.create_session(sink("c1"));
        let data = sink("d1");
        let binding = reg.bind_data_channel(&sid, &data).unwrap().binding;
        assert!(reg.unbind_data_channel(&sid, &binding));
        assert!(reg.contains(&sid));
        // A new data channel may bind afterwards.
        assert!(reg.bind_data_channel(&sid, &data).is_ok());
    }

    #[test]
    fn destroy_is_idempotent_and_returns_binding() {
        let reg = registry();
        let sid = reg.create_session(sink("c1"));
        let _ = reg.add_target(&sid, hello("t")).unwrap();
        let data = sink("d1");
        let _ = reg.bind_data_channel(&sid, &data).unwrap();

        let ended = reg.destroy_session(&sid).unwrap();
        assert_eq!(ended.id, sid);
        assert_eq!(ended.target_count, 1);
        assert_eq!(ended.data_channel.unwrap().id(), "d1");

        assert!(reg.destroy_session(&sid).is_none());
        assert!(!reg.contains(&sid));
        assert!(reg.list_targets(&sid).is_empty());
        assert!(reg.bind_data_channel(&sid, &data).is_err());
    }

    #[test]
    fn control_channel_lookup() {
        let reg = registry();
        let sid = reg.create_session(sink("c1"));
        assert_eq!(reg.control_channel(&sid).unwrap().id(), "c1");
        let _ = reg.destroy_session(&sid);
        assert!(reg.control_channel(&sid).is_none());
    }

    #[test]
    fn stats_counts() {
        let reg = registry();
        let a = reg.create_session(sink("c1"));
        let b = reg.create_session(sink("c2"));
        let _ = reg.add_target(&a, hello("1")).unwrap();
        let _ = reg.add_target(&a, hello("2")).unwrap();
        let _ = reg.add_target(&b, hello("3")).unwrap();
        let data = sink("d1");
        let _ = reg.bind_data_channel(&b, &data).unwrap();

        let stats = reg.stats();
        assert_eq!(
            stats,
            RegistryStats {
                sessions: 2,
                sockets: 2,
                targets: 3,
                bindings: 1,
            }
        );
        assert_eq!(reg.session_count(), 2);
    }

    #[test]
    fn concurrent_sessions_do_not_interfere() {
        let reg = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    let sid = reg.create_session(sink(&format!("c{i}")));
                    for n in 0..50 {
                        let _ = reg.add_target(&sid, hello(&n.to_string())).unwrap();
                    }
                    sid
                })
            })
            .collect();
        for handle in handles {
            let sid = handle.join().unwrap();
            let titles: Vec<String> = reg.list_targets(&sid).into_iter().map(|t| t.title).collect();
            let expected: Vec<String> = (0..50).map(|n| n.to_string()).collect();
            assert_eq!(titles, expected);
        }
    }

    #[test]
    fn destroyed_handle_rejects_bind_and_targets() {
        let reg = registry();
        let sid = reg.create_session(sink("c1"));
        let stale = reg.get(&sid).unwrap();
        let _ = reg.destroy_session(&sid).unwrap();

        assert!(stale.state.lock().destroyed);
        let data = sink("d1");
        assert!(reg.bind_data_channel(&sid, &data).is_err());
        assert!(reg.add_target(&sid, hello("late")).is_err());
        assert!(stale.state.lock().data.is_none());
    }
}
