//! Fixed-capacity session table
//!
//! Lock order is table first, then an individual session, then the token's
//! login state. [`SessionTable::lookup`] hands a locked session back to the
//! caller after the table lock is released; a caller holding such a guard
//! must not take the table lock again.

use crate::error::{fatal, TokenError, TokenResult};
use crate::session::context::{SessionContext, SessionFlags, SessionHandle, TokenInfo, UserType};
use crate::token::LoginState;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, MutexGuard, RawMutex};
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of session slots per token
pub const MAX_SESSIONS: usize = 1024;

type SessionCell<S> = Arc<Mutex<S>>;

/// Snapshot of the session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounts {
    pub all: usize,
    pub rw: usize,
    pub ro: usize,
}

/// A session handed out locked by [`SessionTable::lookup`]
///
/// Dropping the guard releases the session lock.
pub struct SessionGuard<S> {
    handle: SessionHandle,
    guard: ArcMutexGuard<RawMutex, S>,
}

impl<S> SessionGuard<S> {
    pub fn handle(&self) -> SessionHandle {
        self.handle
    }
}

impl<S> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.guard
    }
}

impl<S> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.guard
    }
}

struct TableInner<S> {
    slots: Vec<Option<SessionCell<S>>>,
    count: usize,
    rw_count: usize,
    next_handle: usize,
    /// Login session closed while other sessions stayed open. Kept alive
    /// for the cascade logout, which destroys it.
    retained_login: Option<(SessionHandle, SessionCell<S>)>,
}

/// Table of open sessions for one token
pub struct SessionTable<S> {
    capacity: usize,
    inner: Mutex<TableInner<S>>,
}

impl<S: SessionContext> SessionTable<S> {
    /// Create a table with `capacity` slots
    pub fn new(capacity: usize) -> TokenResult<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| TokenError::HostMemory("session table"))?;
        slots.resize_with(capacity, || None);

        debug!("Created session table with {} slots", capacity);
        Ok(Self {
            capacity,
            inner: Mutex::new(TableInner {
                slots,
                count: 0,
                rw_count: 0,
                next_handle: 0,
                retained_login: None,
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Acquire the table lock
    pub fn lock(&self) -> TableGuard<'_, S> {
        TableGuard {
            capacity: self.capacity,
            inner: self.inner.lock(),
        }
    }

    /// Session counters, taken under the table lock
    pub fn counts(&self) -> SessionCounts {
        self.lock().counts()
    }

    /// Find an open session and return it locked
    ///
    /// The session lock is taken before the table lock is released, so the
    /// caller gets an atomic found-and-locked session.
    pub fn lookup(&self, handle: SessionHandle) -> TokenResult<SessionGuard<S>> {
        if handle.index() >= self.capacity {
            return Err(TokenError::SessionHandleInvalid(handle.0));
        }

        let table = self.lock();
        let session = table.lock_session(handle)?;
        drop(table);

        Ok(session)
    }

    /// Close one session
    pub fn close_by_handle(
        &self,
        login: &Mutex<LoginState>,
        handle: SessionHandle,
    ) -> TokenResult<()> {
        self.lock().close_by_handle(login, handle)
    }

    /// Close every open session under a single table lock
    pub fn close_all(&self, login: &Mutex<LoginState>) {
        self.lock().close_all(login);
    }
}

/// Held table lock; the unlocked table operations live here
///
/// Dropping the guard releases the table lock.
pub struct TableGuard<'a, S> {
    capacity: usize,
    inner: MutexGuard<'a, TableInner<S>>,
}

impl<S: SessionContext> TableGuard<'_, S> {
    pub fn counts(&self) -> SessionCounts {
        let inner = &self.inner;
        if inner.count < inner.rw_count {
            fatal(&format!(
                "rw session count {} exceeds total {}",
                inner.rw_count, inner.count
            ));
        }

        SessionCounts {
            all: inner.count,
            rw: inner.rw_count,
            ro: inner.count - inner.rw_count,
        }
    }

    /// Next handle the allocator will hand out
    pub fn next_handle(&self) -> SessionHandle {
        self.inner.next_handle.into()
    }

    /// Handles of all open sessions, in slot order
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| index.into())
            .collect()
    }

    fn lookup_unlocked(&self, handle: SessionHandle) -> Option<&SessionCell<S>> {
        self.inner.slots.get(handle.index())?.as_ref()
    }

    /// Lock an open session while keeping the table locked
    pub fn lock_session(&self, handle: SessionHandle) -> TokenResult<SessionGuard<S>> {
        let cell = self
            .lookup_unlocked(handle)
            .ok_or(TokenError::SessionHandleInvalid(handle.0))?;

        Ok(SessionGuard {
            handle,
            guard: cell.lock_arc(),
        })
    }

    /// Open a session in the slot at the handle cursor
    pub fn new_session(
        &mut self,
        token: &TokenInfo,
        flags: SessionFlags,
        login: Option<UserType>,
    ) -> TokenResult<SessionHandle> {
        let cursor = self.inner.next_handle;
        match self.inner.slots.get(cursor) {
            None => {
                return Err(TokenError::SessionCount {
                    capacity: self.capacity,
                })
            }
            Some(Some(_)) => fatal(&format!("slot {} at free handle cursor is occupied", cursor)),
            Some(None) => {}
        }

        let ctx = S::open(token, flags, login)?;

        let inner = &mut *self.inner;
        inner.slots[cursor] = Some(Arc::new(Mutex::new(ctx)));
        inner.next_handle += 1;
        inner.count += 1;
        if flags.is_rw() {
            inner.rw_count += 1;
        }

        debug!(
            "Session {} stored, count={} rw_count={}",
            cursor, inner.count, inner.rw_count
        );
        Ok(cursor.into())
    }

    /// Close one session, cascading a logout if it was the last one
    pub fn close_by_handle(
        &mut self,
        login: &Mutex<LoginState>,
        handle: SessionHandle,
    ) -> TokenResult<()> {
        let ctx = self
            .inner
            .slots
            .get_mut(handle.index())
            .and_then(Option::take)
            .ok_or(TokenError::SessionHandleInvalid(handle.0))?;

        self.close_context(login, handle, ctx);
        Ok(())
    }

    /// Close every occupied slot in order
    pub fn close_all(&mut self, login: &Mutex<LoginState>) {
        for index in 0..self.inner.slots.len() {
            let Some(ctx) = self.inner.slots[index].take() else {
                continue;
            };
            self.close_context(login, index.into(), ctx);
        }
    }

    fn close_context(&mut self, login: &Mutex<LoginState>, handle: SessionHandle, ctx: SessionCell<S>) {
        let state = ctx.lock().state();

        let inner = &mut *self.inner;
        if state.is_rw() {
            if inner.rw_count == 0 {
                fatal(&format!("rw session count underflow closing session {}", handle));
            }
            inner.rw_count -= 1;
        }
        inner.count = match inner.count.checked_sub(1) {
            Some(count) => count,
            None => fatal(&format!("session count underflow closing session {}", handle)),
        };

        // The login context outlives its slot: the cascade below destroys it.
        let is_login_ctx = login.lock().session == Some(handle);
        let ctx = if is_login_ctx {
            debug!("Retaining login session {} for cascade logout", handle);
            inner.retained_login = Some((handle, ctx));
            None
        } else {
            Some(ctx)
        };

        if inner.count == 0 {
            self.logout_if_needed(login);
        }

        if let Some(ctx) = ctx {
            destroy(handle, ctx);
        }

        debug!(
            "Session {} closed, count={} rw_count={}",
            handle, self.inner.count, self.inner.rw_count
        );
    }

    fn logout_if_needed(&mut self, login: &Mutex<LoginState>) {
        let snapshot = *login.lock();
        let Some(user) = snapshot.user else {
            return;
        };

        let (handle, ctx) = match self.inner.retained_login.take() {
            Some((handle, ctx)) if snapshot.session == Some(handle) => (handle, ctx),
            _ => fatal("logged in with no login session context to log out"),
        };

        {
            let mut session = ctx.lock();
            if let Err(e) = session.token_logout() {
                fatal(&format!("forced logout of session {} failed: {}", handle, e));
            }
        }

        *login.lock() = LoginState::default();
        info!("Last session closed, {} logged out through session {}", user, handle);
        destroy(handle, ctx);
    }

    /// Destroy the retained login context after an explicit logout
    pub fn release_retained_login(&mut self) {
        if let Some((handle, ctx)) = self.inner.retained_login.take() {
            destroy(handle, ctx);
        }
    }

    /// Notify every open session that `user` logged in
    ///
    /// `trigger` is the session whose caller started the login and already
    /// holds its lock; it is notified without taking the lock again.
    pub fn broadcast_login(&self, user: UserType, trigger: Option<&mut SessionGuard<S>>) {
        self.notify_all(trigger, |session, take_lock| {
            session.login_event(user, take_lock)
        });
    }

    /// Notify every open session that the token logged out
    pub fn broadcast_logout(&self, trigger: Option<&mut SessionGuard<S>>) {
        self.notify_all(trigger, |session, take_lock| {
            session.logout_event(take_lock)
        });
    }

    fn notify_all<F>(&self, mut trigger: Option<&mut SessionGuard<S>>, mut notify: F)
    where
        F: FnMut(&mut S, bool),
    {
        for (index, slot) in self.inner.slots.iter().enumerate() {
            let Some(cell) = slot else {
                continue;
            };

            match trigger.as_deref_mut() {
                Some(guard) if guard.handle().index() == index => notify(&mut **guard, false),
                _ => notify(&mut *cell.lock(), true),
            }
        }
    }
}

fn destroy<S>(handle: SessionHandle, ctx: SessionCell<S>) {
    debug!("Destroying session context {}", handle);
    drop(ctx);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::session::context::SessionState;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::LazyLock;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        Login { id: usize, user: UserType, take_lock: bool },
        Logout { id: usize, take_lock: bool },
        TokenLogout { id: usize },
    }

    /// Shared recorder for every mock opened against one token label
    #[derive(Default)]
    pub struct Probe {
        pub opened: AtomicUsize,
        pub fail_open: AtomicBool,
        pub fail_logout: AtomicBool,
        pub dropped: Mutex<Vec<usize>>,
        pub events: Mutex<Vec<Event>>,
    }

    impl Probe {
        pub fn drops_of(&self, id: usize) -> usize {
            self.dropped.lock().iter().filter(|&&d| d == id).count()
        }
    }

    static PROBES: LazyLock<Mutex<HashMap<String, Arc<Probe>>>> =
        LazyLock::new(|| Mutex::new(HashMap::new()));

    pub fn probe(label: &str) -> Arc<Probe> {
        PROBES
            .lock()
            .entry(label.to_string())
            .or_default()
            .clone()
    }

    pub struct MockSession {
        id: usize,
        rw: bool,
        state: SessionState,
        probe: Arc<Probe>,
    }

    impl SessionContext for MockSession {
        fn open(token: &TokenInfo, flags: SessionFlags, login: Option<UserType>) -> TokenResult<Self> {
            let probe = probe(&token.label);
            if probe.fail_open.load(Ordering::SeqCst) {
                return Err(TokenError::HostMemory("session context"));
            }
            let id = probe.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Self {
                id,
                rw: flags.is_rw(),
                state: SessionState::for_login(flags.is_rw(), login),
                probe,
            })
        }

        fn state(&self) -> SessionState {
            self.state
        }

        fn token_logout(&mut self) -> TokenResult<()> {
            self.probe.events.lock().push(Event::TokenLogout { id: self.id });
            if self.probe.fail_logout.load(Ordering::SeqCst) {
                return Err(TokenError::Internal("logout refused".to_string()));
            }
            self.state = SessionState::for_login(self.rw, None);
            Ok(())
        }

        fn login_event(&mut self, user: UserType, take_lock: bool) {
            self.probe.events.lock().push(Event::Login {
                id: self.id,
                user,
                take_lock,
            });
            self.state = SessionState::for_login(self.rw, Some(user));
        }

        fn logout_event(&mut self, take_lock: bool) {
            self.probe.events.lock().push(Event::Logout {
                id: self.id,
                take_lock,
            });
            self.state = SessionState::for_login(self.rw, None);
        }
    }

    impl Drop for MockSession {
        fn drop(&mut self) {
            self.probe.dropped.lock().push(self.id);
        }
    }

    fn setup(label: &str, capacity: usize) -> (SessionTable<MockSession>, TokenInfo, Mutex<LoginState>, Arc<Probe>) {
        let table = SessionTable::new(capacity).unwrap();
        (table, TokenInfo::new(label), Mutex::new(LoginState::default()), probe(label))
    }

    fn logged_in(user: UserType, handle: u64) -> LoginState {
        LoginState {
            user: Some(user),
            session: Some(SessionHandle(handle)),
        }
    }

    fn counts(all: usize, rw: usize) -> SessionCounts {
        SessionCounts { all, rw, ro: all - rw }
    }

    #[test]
    fn open_and_close_scenario() {
        let (table, token, login, probe) = setup("table-scenario", 8);

        let mut guard = table.lock();
        let a = guard.new_session(&token, SessionFlags::read_write(), None).unwrap();
        assert_eq!(a, SessionHandle(0));
        assert_eq!(guard.counts(), counts(1, 1));

        let b = guard.new_session(&token, SessionFlags::read_only(), None).unwrap();
        assert_eq!(b, SessionHandle(1));
        assert_eq!(guard.counts(), counts(2, 1));
        drop(guard);

        table.close_by_handle(&login, a).unwrap();
        assert_eq!(table.counts(), counts(1, 0));

        *login.lock() = logged_in(UserType::User, 1);
        table.close_by_handle(&login, b).unwrap();

        assert_eq!(table.counts(), counts(0, 0));
        assert_eq!(*login.lock(), LoginState::default());
        assert_eq!(probe.drops_of(1), 1);
        assert_eq!(probe.events.lock().as_slice(), &[Event::TokenLogout { id: 1 }]);
    }

    #[test]
    fn close_decrements_rw_only_for_rw_sessions() {
        let (table, token, login, _) = setup("table-rw-counts", 8);

        let mut guard = table.lock();
        let ro = guard.new_session(&token, SessionFlags::read_only(), None).unwrap();
        let rw = guard.new_session(&token, SessionFlags::read_write(), None).unwrap();
        let rw2 = guard.new_session(&token, SessionFlags::read_write(), None).unwrap();
        assert_eq!(guard.counts(), counts(3, 2));

        guard.close_by_handle(&login, ro).unwrap();
        assert_eq!(guard.counts(), counts(2, 2));
        guard.close_by_handle(&login, rw).unwrap();
        assert_eq!(guard.counts(), counts(1, 1));
        guard.close_by_handle(&login, rw2).unwrap();
        assert_eq!(guard.counts(), counts(0, 0));
    }

    #[test]
    fn closing_twice_is_invalid_handle() {
        let (table, token, login, probe) = setup("table-double-close", 4);

        let h = table.lock().new_session(&token, SessionFlags::read_only(), None).unwrap();
        table.close_by_handle(&login, h).unwrap();

        let err = table.close_by_handle(&login, h).unwrap_err();
        assert!(matches!(err, TokenError::SessionHandleInvalid(0)));
        assert_eq!(probe.drops_of(0), 1);
    }

    #[test]
    fn lookup_rejects_unknown_handles() {
        let (table, token, login, _) = setup("table-lookup-invalid", 4);

        assert!(matches!(
            table.lookup(SessionHandle(2)),
            Err(TokenError::SessionHandleInvalid(2))
        ));
        assert!(matches!(
            table.lookup(SessionHandle(4)),
            Err(TokenError::SessionHandleInvalid(4))
        ));
        assert!(table.lookup(SessionHandle(u64::MAX)).is_err());

        let h = table.lock().new_session(&token, SessionFlags::read_only(), None).unwrap();
        table.close_by_handle(&login, h).unwrap();
        assert!(table.lookup(h).is_err());
    }

    #[test]
    fn lookup_returns_locked_session_with_table_unlocked() {
        let (table, token, _, _) = setup("table-lookup-locked", 4);
        let h = table.lock().new_session(&token, SessionFlags::read_write(), None).unwrap();

        let session = table.lookup(h).unwrap();
        assert_eq!(session.handle(), h);
        assert_eq!(session.state(), SessionState::RwPublic);

        // Table lock released, session lock retained.
        let inner = table.inner.try_lock().expect("table lock must be free");
        let cell = inner.slots[0].as_ref().unwrap();
        assert!(cell.try_lock().is_none());
        drop(inner);

        drop(session);
        assert!(table.inner.lock().slots[0].as_ref().unwrap().try_lock().is_some());
    }

    #[test]
    fn failed_open_leaves_table_untouched() {
        let (table, token, _, probe) = setup("table-open-fails", 4);

        probe.fail_open.store(true, Ordering::SeqCst);
        let mut guard = table.lock();
        let err = guard.new_session(&token, SessionFlags::read_write(), None).unwrap_err();
        assert!(matches!(err, TokenError::HostMemory(_)));
        assert_eq!(guard.counts(), counts(0, 0));
        assert_eq!(guard.next_handle(), SessionHandle(0));

        probe.fail_open.store(false, Ordering::SeqCst);
        let h = guard.new_session(&token, SessionFlags::read_write(), None).unwrap();
        assert_eq!(h, SessionHandle(0));
    }

    #[test]
    fn table_allocation_failure_is_host_memory() {
        let err = SessionTable::<MockSession>::new(usize::MAX).err().unwrap();
        assert!(matches!(err, TokenError::HostMemory("session table")));
    }

    #[test]
    fn handles_are_never_reused() {
        let (table, token, login, _) = setup("table-no-reuse", 2);

        let mut guard = table.lock();
        let a = guard.new_session(&token, SessionFlags::read_only(), None).unwrap();
        let b = guard.new_session(&token, SessionFlags::read_only(), None).unwrap();
        guard.close_by_handle(&login, a).unwrap();
        guard.close_by_handle(&login, b).unwrap();

        let err = guard.new_session(&token, SessionFlags::read_only(), None).unwrap_err();
        assert!(matches!(err, TokenError::SessionCount { capacity: 2 }));
        assert_eq!(guard.counts(), counts(0, 0));
    }

    #[test]
    fn closing_login_session_retains_it_until_last_close() {
        let (table, token, login, probe) = setup("table-retain-login", 4);

        let mut guard = table.lock();
        let a = guard.new_session(&token, SessionFlags::read_write(), None).unwrap();
        let b = guard.new_session(&token, SessionFlags::read_only(), None).unwrap();
        *login.lock() = logged_in(UserType::User, a.0);

        guard.close_by_handle(&login, a).unwrap();
        assert_eq!(guard.counts(), counts(1, 0));
        assert_eq!(probe.drops_of(0), 0);
        assert!(guard.lock_session(a).is_err());
        assert_eq!(login.lock().user, Some(UserType::User));

        guard.close_by_handle(&login, b).unwrap();
        assert_eq!(guard.counts(), counts(0, 0));
        assert_eq!(probe.drops_of(0), 1);
        assert_eq!(probe.drops_of(1), 1);
        assert_eq!(probe.events.lock().as_slice(), &[Event::TokenLogout { id: 0 }]);
        assert_eq!(*login.lock(), LoginState::default());
    }

    #[test]
    fn close_all_resets_login_regardless_of_scan_order() {
        for (run, login_slot) in [0u64, 1, 2].into_iter().enumerate() {
            let label = format!("table-close-all-{}", run);
            let (table, token, login, probe) = setup(&label, 4);

            let mut guard = table.lock();
            guard.new_session(&token, SessionFlags::read_write(), None).unwrap();
            guard.new_session(&token, SessionFlags::read_only(), None).unwrap();
            guard.new_session(&token, SessionFlags::read_write(), None).unwrap();
            drop(guard);
            *login.lock() = logged_in(UserType::User, login_slot);

            table.close_all(&login);

            assert_eq!(table.counts(), counts(0, 0));
            assert_eq!(*login.lock(), LoginState::default());
            for id in 0..3 {
                assert_eq!(probe.drops_of(id), 1, "session {} in run {}", id, run);
            }
            assert_eq!(
                probe.events.lock().as_slice(),
                &[Event::TokenLogout {
                    id: login_slot as usize
                }]
            );
        }
    }

    #[test]
    fn close_all_without_login_skips_logout() {
        let (table, token, login, probe) = setup("table-close-all-public", 4);

        let mut guard = table.lock();
        guard.new_session(&token, SessionFlags::read_only(), None).unwrap();
        guard.new_session(&token, SessionFlags::read_write(), None).unwrap();
        guard.close_by_handle(&login, SessionHandle(0)).unwrap();
        guard.close_all(&login);

        assert_eq!(guard.counts(), counts(0, 0));
        assert!(probe.events.lock().is_empty());
        assert_eq!(probe.dropped.lock().len(), 2);
    }

    #[test]
    fn broadcast_skips_lock_for_trigger() {
        let (table, token, _, probe) = setup("table-broadcast", 4);

        let mut guard = table.lock();
        for _ in 0..3 {
            guard.new_session(&token, SessionFlags::read_write(), None).unwrap();
        }
        guard.close_by_handle(&Mutex::new(LoginState::default()), SessionHandle(0)).unwrap();

        // Holding the trigger's lock: taking it again would deadlock.
        let mut trigger = guard.lock_session(SessionHandle(2)).unwrap();
        guard.broadcast_login(UserType::So, Some(&mut trigger));
        guard.broadcast_logout(Some(&mut trigger));
        assert_eq!(trigger.state(), SessionState::RwPublic);

        let events = probe.events.lock().clone();
        assert_eq!(
            events,
            vec![
                Event::Login { id: 1, user: UserType::So, take_lock: true },
                Event::Login { id: 2, user: UserType::So, take_lock: false },
                Event::Logout { id: 1, take_lock: true },
                Event::Logout { id: 2, take_lock: false },
            ]
        );
    }

    #[test]
    fn broadcast_without_trigger_locks_everyone() {
        let (table, token, _, probe) = setup("table-broadcast-all", 4);

        let mut guard = table.lock();
        guard.new_session(&token, SessionFlags::read_only(), None).unwrap();
        guard.new_session(&token, SessionFlags::read_write(), None).unwrap();
        guard.broadcast_login(UserType::User, None);

        assert!(probe
            .events
            .lock()
            .iter()
            .all(|e| matches!(e, Event::Login { take_lock: true, .. })));
        assert_eq!(
            guard.lock_session(SessionHandle(0)).unwrap().state(),
            SessionState::RoUser
        );
    }

    #[test]
    #[should_panic(expected = "forced logout")]
    fn failed_cascade_logout_is_fatal() {
        let (table, token, login, probe) = setup("table-logout-fails", 2);

        let h = table.lock().new_session(&token, SessionFlags::read_write(), None).unwrap();
        *login.lock() = logged_in(UserType::User, h.0);
        probe.fail_logout.store(true, Ordering::SeqCst);

        let _ = table.close_by_handle(&login, h);
    }

    #[test]
    #[should_panic(expected = "free handle cursor is occupied")]
    fn occupied_cursor_slot_is_fatal() {
        let (table, token, _, _) = setup("table-corrupt-cursor", 2);

        let mut guard = table.lock();
        guard.new_session(&token, SessionFlags::read_only(), None).unwrap();
        guard.inner.next_handle = 0;
        let _ = guard.new_session(&token, SessionFlags::read_only(), None);
    }

    #[test]
    #[should_panic(expected = "rw session count underflow")]
    fn rw_underflow_is_fatal() {
        let (table, token, login, _) = setup("table-rw-underflow", 2);

        let mut guard = table.lock();
        let h = guard.new_session(&token, SessionFlags::read_write(), None).unwrap();
        guard.inner.rw_count = 0;
        let _ = guard.close_by_handle(&login, h);
    }

    #[test]
    fn concurrent_open_close_keeps_counts_consistent() {
        let (table, token, login, _) = setup("table-concurrent", 4096);

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let (table, token, login) = (&table, &token, &login);
                scope.spawn(move || {
                    for i in 0..64 {
                        let flags = if (worker + i) % 2 == 0 {
                            SessionFlags::read_write()
                        } else {
                            SessionFlags::read_only()
                        };
                        let h = table.lock().new_session(token, flags, None).unwrap();

                        let c = table.counts();
                        assert!(c.rw <= c.all && c.all <= table.capacity());

                        if i % 3 != 0 {
                            drop(table.lookup(h).unwrap());
                            table.close_by_handle(login, h).unwrap();
                        }
                    }
                });
            }
        });

        let guard = table.lock();
        let c = guard.counts();
        assert_eq!(c.all, guard.handles().len());
        assert_eq!(guard.next_handle(), SessionHandle(8 * 64));
        assert_eq!(c.all, 8 * 22);
    }
}
