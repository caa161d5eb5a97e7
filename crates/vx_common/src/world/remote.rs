//! Fetching chunk contents from a remote authority, one poll per tick.
//!
//! A fetch inserts a `Loading` placeholder through the write phase, launches the
//! request, and then re-enqueues a polling read task tick after tick until the
//! authority answers. The answer is installed by a write task; if the placeholder has
//! been retired by then, the blob is dropped silently. A failed or vanished request is
//! never retried: the placeholder stays `Loading` until the streamer retires it by
//! distance.

use tracing::warn;
use vx_schemas::coordinates::{AbsBlockPos, AbsChunkPos};
use vx_schemas::voxel::{Chunk, ChunkBlob};

use crate::prelude::*;
use crate::scheduler::ReadTask;

/// The request surface of the remote authority, as seen by the engine.
///
/// Every method is asynchronous: the returned [`Deferred`] resolves once the answer
/// arrives over the wire.
pub trait RemoteAuthority: Send + Sync + 'static {
    /// Requests the contents of a chunk; the authority materializes it if necessary.
    fn get_chunk(&self, world_id: u32, position: AbsChunkPos) -> Deferred<ChunkBlob>;
    /// Lists the world ids the authority serves.
    fn get_available_world_ids(&self) -> Deferred<Vec<u32>>;
    /// Fetches the metadata map of a world; contains at least the key `"name"`.
    fn get_world_info(&self, world_id: u32) -> Deferred<HashMap<String, String>>;
    /// Asks the authority to replace the addressed voxel with air.
    fn pick_block(&self, world_id: u32, position: AbsBlockPos) -> Deferred<()>;
}

/// Builds the read task that starts fetching one chunk from the authority.
///
/// `launch_lock` serializes the launch of outgoing requests so wire-level ordering is
/// preserved even when streamer tasks run on multiple workers.
pub(crate) fn make_fetch_task(
    client: Arc<dyn RemoteAuthority>,
    launch_lock: Arc<Mutex<()>>,
    world_id: u32,
    position: AbsChunkPos,
) -> ReadTask {
    Box::new(move |service| {
        {
            let worlds = service.worlds();
            let Some(world) = worlds.get(world_id) else { return };
            if world.is_chunk_loaded(position) {
                return;
            }
        }

        // Reserve the slot so the streamer stops re-requesting this position.
        service.dispatcher().add_write_task(Box::new(move |worlds| {
            if let Some(world) = worlds.get_mut(world_id) {
                if !world.is_chunk_loaded(position) {
                    world.insert_chunk_and_update(Chunk::new_loading(position, world_id));
                }
            }
        }));

        let result = {
            let _ordered = launch_lock.lock().unwrap();
            client.get_chunk(world_id, position)
        };
        service.dispatcher().add_read_task(make_poll_task(world_id, position, result));
    })
}

/// Builds the read task that checks a pending fetch and either installs the result,
/// re-enqueues itself for the next tick, or gives up on a lost request.
fn make_poll_task(world_id: u32, position: AbsChunkPos, mut result: Deferred<ChunkBlob>) -> ReadTask {
    Box::new(move |service| {
        match result.try_resolve() {
            None => {
                if result.is_lost() {
                    warn!(%position, "Remote chunk request dropped by the authority, leaving the placeholder to be retired");
                    return;
                }
                // Not ready yet: check again in the next tick.
                let next = make_poll_task(world_id, position, result);
                service.dispatcher().add_read_task(next);
            }
            Some(Ok(blob)) => {
                service.dispatcher().add_write_task(Box::new(move |worlds| {
                    let Some(world) = worlds.get_mut(world_id) else { return };
                    // A retired placeholder drops the blob silently.
                    let Some(chunk) = world.chunks_mut().get_mut(position) else {
                        return;
                    };
                    if let Err(e) = chunk.replace(&blob) {
                        warn!(%position, "Discarding malformed remote chunk contents: {e}");
                    }
                }));
            }
            Some(Err(e)) => {
                warn!(%position, "Remote chunk request failed: {e}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use vx_schemas::voxel::BlockData;

    use super::*;
    use crate::service::ChunkService;

    struct ScriptedAuthority {
        pending: Mutex<Vec<(AbsChunkPos, AsyncOneshotSender<Result<ChunkBlob>>)>>,
    }

    impl ScriptedAuthority {
        fn new() -> Self {
            Self {
                pending: Mutex::new(Vec::new()),
            }
        }

        fn resolve(&self, position: AbsChunkPos, blob: ChunkBlob) {
            let mut pending = self.pending.lock().unwrap();
            let idx = pending
                .iter()
                .position(|(p, _)| *p == position)
                .expect("no pending request for position");
            let (_, tx) = pending.swap_remove(idx);
            tx.send(Ok(blob)).unwrap();
        }

        fn abandon_all(&self) {
            self.pending.lock().unwrap().clear();
        }
    }

    impl RemoteAuthority for ScriptedAuthority {
        fn get_chunk(&self, _world_id: u32, position: AbsChunkPos) -> Deferred<ChunkBlob> {
            let (result, tx) = Deferred::pair();
            self.pending.lock().unwrap().push((position, tx));
            result
        }

        fn get_available_world_ids(&self) -> Deferred<Vec<u32>> {
            Deferred::ready(vec![0])
        }

        fn get_world_info(&self, _world_id: u32) -> Deferred<HashMap<String, String>> {
            Deferred::ready(HashMap::new())
        }

        fn pick_block(&self, _world_id: u32, _position: AbsBlockPos) -> Deferred<()> {
            Deferred::ready(())
        }
    }

    fn wait_for<F: Fn() -> bool>(what: &str, cond: F) {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while !cond() {
            assert!(std::time::Instant::now() < deadline, "Timed out waiting for {what}");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn fetch_transitions_placeholder_after_late_answer() {
        let service = ChunkService::new(false, 2, Duration::from_millis(2));
        service.worlds_mut().create_world("client_world");
        let authority = Arc::new(ScriptedAuthority::new());
        let position = AbsChunkPos::new(2, 0, 0);

        service.dispatcher().add_read_task(make_fetch_task(
            Arc::clone(&authority) as Arc<dyn RemoteAuthority>,
            Arc::new(Mutex::new(())),
            0,
            position,
        ));
        service.start();

        // The placeholder appears and stays Loading while the answer is pending.
        wait_for("placeholder insertion", || {
            service.worlds().get(0).unwrap().is_chunk_loaded(position)
        });
        let ticks_before_answer = service.dispatcher().completed_ticks() + 3;
        wait_for("a few polling ticks", || {
            service.dispatcher().completed_ticks() >= ticks_before_answer
        });
        assert!(service.worlds().get(0).unwrap().chunks().get(position).unwrap().is_loading());

        let content = BlockData::new(9, 4, 1);
        authority.resolve(position, vec![content]);
        wait_for("placeholder replacement", || {
            !service.worlds().get(0).unwrap().chunks().get(position).unwrap().is_loading()
        });
        {
            let worlds = service.worlds();
            let chunk = worlds.get(0).unwrap().chunks().get(position).unwrap();
            assert_eq!(chunk.export(), vec![content]);
        }
        service.shutdown();
    }

    #[test]
    fn abandoned_fetch_leaves_placeholder_loading() {
        let service = ChunkService::new(false, 1, Duration::from_millis(2));
        service.worlds_mut().create_world("client_world");
        let authority = Arc::new(ScriptedAuthority::new());
        let position = AbsChunkPos::new(-1, 3, 0);

        service.dispatcher().add_read_task(make_fetch_task(
            Arc::clone(&authority) as Arc<dyn RemoteAuthority>,
            Arc::new(Mutex::new(())),
            0,
            position,
        ));
        service.start();
        wait_for("placeholder insertion", || {
            service.worlds().get(0).unwrap().is_chunk_loaded(position)
        });

        authority.abandon_all();
        let settle = service.dispatcher().completed_ticks() + 4;
        wait_for("polling to settle", || service.dispatcher().completed_ticks() >= settle);

        // No retry, no replacement: the chunk stays a Loading placeholder for the
        // streamer to retire by distance.
        assert!(service.worlds().get(0).unwrap().chunks().get(position).unwrap().is_loading());
        service.shutdown();
    }
}
