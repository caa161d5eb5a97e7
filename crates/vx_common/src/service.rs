//! The chunk service: the composition root owning the worlds and the tick engine.

use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::time::Duration;

use crate::prelude::*;
use crate::scheduler::{TaskDispatcher, TICK_PERIOD};
use crate::world::WorldManager;

/// Manages the worlds and chunks of one game instance and schedules all computation
/// against them.
///
/// There is no process-wide instance: the service is constructed once at startup and
/// passed explicitly into task closures, which keeps secondary instances possible in
/// tests and impossible to reach by accident in game code.
///
/// The world collection sits behind an [`RwLock`] so the phase discipline of the
/// [`TaskDispatcher`] is also enforced by the compiler: read and render tasks can only
/// take the shared guard, while the write phase takes the exclusive guard once for its
/// whole serial drain.
pub struct ChunkService {
    worlds: RwLock<WorldManager>,
    dispatcher: TaskDispatcher,
    authority: bool,
}

impl ChunkService {
    /// Constructs a stopped service.
    ///
    /// An authoritative service's chunk data is canonical: chunks materialize through
    /// the local generator and storage. A non-authoritative service (a multiplayer
    /// client) fetches chunk contents from its remote authority instead.
    pub fn new(authority: bool, update_threads: usize, tick_period: Duration) -> Arc<Self> {
        Arc::new(Self {
            worlds: RwLock::new(WorldManager::default()),
            dispatcher: TaskDispatcher::new(update_threads, tick_period),
            authority,
        })
    }

    /// Constructs a service with the default tick period and the given pool size.
    pub fn new_default(authority: bool, update_threads: usize) -> Arc<Self> {
        Self::new(authority, update_threads, TICK_PERIOD)
    }

    /// Starts the tick engine. Worlds are usually created before this point.
    pub fn start(self: &Arc<Self>) {
        self.dispatcher.start(self);
    }

    /// Stops the tick engine, letting the current tick finish. Must be called before
    /// the service can be dropped, as the worker threads hold references to it.
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
    }

    /// Shared access to the worlds; the access mode of read and render tasks.
    pub fn worlds(&self) -> RwLockReadGuard<'_, WorldManager> {
        self.worlds.read().unwrap()
    }

    /// Exclusive access to the worlds. Reserved for the write phase and for startup
    /// code running before [`Self::start`].
    pub fn worlds_mut(&self) -> RwLockWriteGuard<'_, WorldManager> {
        self.worlds.write().unwrap()
    }

    /// The tick engine.
    pub fn dispatcher(&self) -> &TaskDispatcher {
        &self.dispatcher
    }

    /// Whether this instance's chunk data is canonical.
    pub fn is_authority(&self) -> bool {
        self.authority
    }

    /// Convenience for the main thread: drains pending render tasks. See
    /// [`TaskDispatcher::handle_render_tasks`].
    pub fn handle_render_tasks(&self) -> usize {
        self.dispatcher.handle_render_tasks(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worlds_survive_service_lifecycle() {
        let service = ChunkService::new(true, 1, Duration::from_millis(2));
        service.worlds_mut().create_world("alpha");
        service.start();
        {
            let worlds = service.worlds();
            assert_eq!(worlds.get_by_name("alpha").unwrap().id(), 0);
        }
        service.shutdown();
        assert!(service.is_authority());
    }

    #[test]
    fn render_drain_runs_through_service() {
        let service = ChunkService::new(false, 1, Duration::from_millis(2));
        let hit = Arc::new(AtomicBool::new(false));
        let hit_flag = Arc::clone(&hit);
        service.dispatcher().add_render_task(Box::new(move |svc| {
            assert!(!svc.is_authority());
            hit_flag.store(true, AtomicOrdering::Release);
        }));
        assert_eq!(service.handle_render_tasks(), 1);
        assert!(hit.load(AtomicOrdering::Acquire));
    }
}
