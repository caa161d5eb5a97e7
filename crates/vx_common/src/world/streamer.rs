//! Keeping the chunks around every observer resident: the load/unload detector and the
//! tasks it spawns.

use std::cmp::Reverse;

use itertools::iproduct;
use tracing::warn;
use vx_schemas::coordinates::AbsChunkPos;
use vx_schemas::voxel::Chunk;

use crate::config::GameConfigHandle;
use crate::observer::Observer;
use crate::prelude::*;
use crate::scheduler::{ReadTask, RegularReadTask, WriteTask};
use crate::service::ChunkService;
use crate::util::BoundedList;
use crate::world::remote::{self, RemoteAuthority};
use crate::world::storage::WorldStorage;

/// Upper bound on load tasks enqueued by one streamer pass.
pub const MAX_CHUNK_LOAD_COUNT: usize = 64;
/// Upper bound on retire tasks enqueued by one streamer pass.
pub const MAX_CHUNK_UNLOAD_COUNT: usize = 64;

/// How missing chunks are materialized.
pub enum StreamingMode {
    /// This instance is the authority: consult storage, then generate.
    Authority {
        /// Persistent chunk storage consulted before generating.
        storage: Arc<dyn WorldStorage>,
    },
    /// A remote authority owns the canonical data; ask it for every chunk.
    Remote {
        /// Connection to the authority.
        client: Arc<dyn RemoteAuthority>,
        /// Serializes request launches to preserve wire-level ordering across workers.
        launch_lock: Arc<Mutex<()>>,
    },
}

impl StreamingMode {
    /// Authority mode over the given storage.
    pub fn authority(storage: Arc<dyn WorldStorage>) -> Self {
        Self::Authority { storage }
    }

    /// Client mode against the given authority connection.
    pub fn remote(client: Arc<dyn RemoteAuthority>) -> Self {
        Self::Remote {
            client,
            launch_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// The per-observer regular read task that keeps nearby chunks loaded and retires the
/// ones that drifted out of range.
///
/// Every pass walks the loaded chunk set once: chunks inside the load range get their
/// last-touch timestamp refreshed, chunks outside become retire candidates ordered
/// farthest-first. The load scan walks the cube of in-range coordinates and keeps the
/// nearest missing ones. Both selections use squared euclidean block distance to the
/// chunk midpoint (no sqrt per chunk) inside a chebyshev outer filter, held in
/// fixed-capacity ordered lists so per-pass memory stays flat.
pub struct ChunkStreamerTask {
    world_id: u32,
    observer: Arc<Observer>,
    config: GameConfigHandle,
    mode: StreamingMode,
}

impl ChunkStreamerTask {
    /// Constructs the streamer for one world/observer pair.
    pub fn new(world_id: u32, observer: Arc<Observer>, config: GameConfigHandle, mode: StreamingMode) -> Self {
        Self {
            world_id,
            observer,
            config,
            mode,
        }
    }

    fn make_load_task(&self, position: AbsChunkPos) -> ReadTask {
        match &self.mode {
            StreamingMode::Authority { storage } => make_build_or_load_task(Arc::clone(storage), self.world_id, position),
            StreamingMode::Remote { client, launch_lock } => {
                remote::make_fetch_task(Arc::clone(client), Arc::clone(launch_lock), self.world_id, position)
            }
        }
    }
}

impl RegularReadTask for ChunkStreamerTask {
    fn run(&self, service: &ChunkService) {
        let load_range = self.config.peek().server.load_distance.max(0);
        let center_block = self.observer.block_position();
        let center_chunk = AbsChunkPos::from(center_block);

        let mut load_list: BoundedList<i64, AbsChunkPos, MAX_CHUNK_LOAD_COUNT> = BoundedList::new();
        let mut unload_list: BoundedList<Reverse<i64>, AbsChunkPos, MAX_CHUNK_UNLOAD_COUNT> = BoundedList::new();

        {
            let worlds = service.worlds();
            let Some(world) = worlds.get(self.world_id) else {
                warn!(world_id = self.world_id, "Streamer target world missing");
                return;
            };

            for (&pos, chunk) in world.chunks().iter() {
                if (pos - center_chunk).chebyshev() > load_range {
                    let dist = (pos.middle_block() - center_block).length_squared();
                    unload_list.insert(Reverse(dist), pos);
                } else {
                    chunk.mark_request();
                }
            }

            for (x, y, z) in iproduct!(
                center_chunk.x - load_range..=center_chunk.x + load_range,
                center_chunk.y - load_range..=center_chunk.y + load_range,
                center_chunk.z - load_range..=center_chunk.z + load_range
            ) {
                let pos = AbsChunkPos::new(x, y, z);
                if !world.is_chunk_loaded(pos) {
                    let dist = (pos.middle_block() - center_block).length_squared();
                    load_list.insert(dist, pos);
                }
            }
        }

        for (_, pos) in load_list {
            service.dispatcher().add_read_task_now(self.make_load_task(pos));
        }
        let save_to = match &self.mode {
            StreamingMode::Authority { storage } => Some(Arc::clone(storage)),
            StreamingMode::Remote { .. } => None,
        };
        for (_, pos) in unload_list {
            service
                .dispatcher()
                .add_write_task(make_retire_task(self.world_id, pos, save_to.clone()));
        }
    }
}

/// Builds the read task that materializes one chunk locally: a no-op if it appeared in
/// the meantime, otherwise loaded from storage or built by the generator, then handed
/// to the write phase for insertion.
fn make_build_or_load_task(storage: Arc<dyn WorldStorage>, world_id: u32, position: AbsChunkPos) -> ReadTask {
    Box::new(move |service| {
        let daylight = {
            let worlds = service.worlds();
            let Some(world) = worlds.get(world_id) else { return };
            if world.is_chunk_loaded(position) {
                return;
            }
            world.daylight_brightness()
        };

        let chunk = match storage.request_chunk(position) {
            Ok(Some(blob)) => match Chunk::from_blob(position, world_id, &blob) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(%position, "Stored chunk blob rejected ({e}), regenerating");
                    Chunk::new_built(position, world_id, daylight)
                }
            },
            Ok(None) => Chunk::new_built(position, world_id, daylight),
            Err(e) => {
                warn!(%position, "Chunk storage lookup failed ({e}), regenerating");
                Chunk::new_built(position, world_id, daylight)
            }
        };

        service.dispatcher().add_write_task(Box::new(move |worlds| {
            if let Some(world) = worlds.get_mut(world_id) {
                world.insert_chunk_and_update(chunk);
            }
        }));
    })
}

/// Builds the write task that removes one out-of-range chunk, unless it is still
/// referenced or was touched within the retention window. In authority mode, locally
/// modified chunks are persisted before they leave memory.
fn make_retire_task(world_id: u32, position: AbsChunkPos, save_to: Option<Arc<dyn WorldStorage>>) -> WriteTask {
    Box::new(move |worlds| {
        let Some(world) = worlds.get_mut(world_id) else { return };
        let retirable = world.chunks().get(position).is_some_and(Chunk::is_retirable);
        if !retirable {
            return;
        }
        let Some(storage) = &save_to else {
            world.delete_chunk(position);
            return;
        };
        let Some(chunk) = world.chunks_mut().remove(position) else { return };
        if chunk.is_modified() {
            if let Err(e) = storage.save_chunk(position, &chunk.export()) {
                warn!(%position, "Could not persist a retiring chunk: {e}");
            }
        }
    })
}

/// Registers the streaming and kinematics tasks for an observer entering a world.
pub fn register_observer_tasks(
    service: &ChunkService,
    world_id: u32,
    observer: &Arc<Observer>,
    config: &GameConfigHandle,
    mode: StreamingMode,
) {
    service.dispatcher().add_regular_read_task(Arc::new(ChunkStreamerTask::new(
        world_id,
        Arc::clone(observer),
        config.clone(),
        mode,
    )));
    service
        .dispatcher()
        .add_regular_read_task(Arc::new(crate::observer::ObserverUpdateTask::new(
            world_id,
            Arc::clone(observer),
            config.clone(),
        )));
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bevy_math::DVec3;
    use vx_schemas::voxel::chunk::RETENTION_WINDOW;

    use super::*;
    use crate::config::GameConfig;
    use crate::world::storage::MemoryWorldStorage;

    fn wait_for<F: Fn() -> bool>(what: &str, cond: F) {
        let deadline = std::time::Instant::now() + Duration::from_secs(20);
        while !cond() {
            assert!(std::time::Instant::now() < deadline, "Timed out waiting for {what}");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn streaming_service(tick: Duration) -> (Arc<ChunkService>, Arc<Observer>, Arc<MemoryWorldStorage>) {
        let service = ChunkService::new(true, 2, tick);
        service.worlds_mut().create_world("stream_world");
        let observer = Arc::new(Observer::new(DVec3::ZERO));
        let config = GameConfig::default().new_handle();
        let storage = Arc::new(MemoryWorldStorage::new());
        let mode = StreamingMode::authority(Arc::clone(&storage) as Arc<dyn WorldStorage>);
        service.dispatcher().add_regular_read_task(Arc::new(ChunkStreamerTask::new(
            0,
            Arc::clone(&observer),
            config,
            mode,
        )));
        (service, observer, storage)
    }

    #[test]
    fn load_cap_and_range() {
        let (service, _observer, _storage) = streaming_service(Duration::from_millis(100));
        service.start();

        wait_for("first streamed tick", || service.dispatcher().completed_ticks() >= 1);
        {
            let worlds = service.worlds();
            let chunks = worlds.get(0).unwrap().chunks();
            // One pass enqueues at most MAX_CHUNK_LOAD_COUNT loads, nearest first.
            assert!(chunks.len() <= MAX_CHUNK_LOAD_COUNT, "loaded {} chunks", chunks.len());
            assert!(chunks.contains(AbsChunkPos::ZERO), "nearest chunk not among the first loads");
        }

        // The full in-range cube (9^3 for range 4) fills over the following passes, and
        // nothing outside the chebyshev range ever loads.
        wait_for("full range residency", || {
            service.worlds().get(0).unwrap().chunks().len() >= 9 * 9 * 9
        });
        {
            let worlds = service.worlds();
            let chunks = worlds.get(0).unwrap().chunks();
            assert_eq!(chunks.len(), 9 * 9 * 9);
            assert!(!chunks.contains(AbsChunkPos::new(5, 0, 0)));
            for (&pos, _) in chunks.iter() {
                assert!((pos - AbsChunkPos::ZERO).chebyshev() <= 4, "out-of-range chunk {pos}");
            }
        }
        service.shutdown();
    }

    #[test]
    fn retirement_respects_references_and_retention() {
        let (service, observer, storage) = streaming_service(Duration::from_millis(5));
        service.start();
        wait_for("initial residency", || {
            service.worlds().get(0).unwrap().chunks().len() >= 9 * 9 * 9
        });

        // Author a voxel in the origin chunk so its retirement must persist it.
        let edited = vx_schemas::coordinates::AbsBlockPos::new(1, 2, 3);
        service.dispatcher().add_write_task(Box::new(move |worlds| {
            worlds
                .get_mut(0)
                .unwrap()
                .set_block(edited, vx_schemas::voxel::BlockData::new(7, 0, 0))
                .unwrap();
        }));
        wait_for("voxel edit", || {
            service.worlds().get(0).unwrap().get_block(edited).map(|b| b.id()) == Ok(7)
        });

        // Move the observer far away; the old chunks are now unload candidates but are
        // inside their retention window, so they must survive the next passes.
        observer.set_position(DVec3::new(1000.0, 0.0, 0.0));
        let settle = service.dispatcher().completed_ticks() + 4;
        wait_for("post-move passes", || service.dispatcher().completed_ticks() >= settle);
        assert!(service.worlds().get(0).unwrap().is_chunk_loaded(AbsChunkPos::ZERO));

        // Age every chunk past the retention window, but pin the origin chunk.
        {
            let worlds = service.worlds();
            let chunks = worlds.get(0).unwrap().chunks();
            for (_, chunk) in chunks.iter() {
                chunk.backdate_touch(RETENTION_WINDOW + Duration::from_secs(1));
            }
            chunks.get(AbsChunkPos::ZERO).unwrap().acquire();
        }
        wait_for("aged chunks retired", || {
            let worlds = service.worlds();
            let chunks = worlds.get(0).unwrap().chunks();
            chunks.iter().filter(|(p, _)| (**p - AbsChunkPos::new(31, 0, 0)).chebyshev() > 4).count() == 1
        });
        // Only the pinned chunk survived out of range.
        assert!(service.worlds().get(0).unwrap().is_chunk_loaded(AbsChunkPos::ZERO));

        // Releasing the reference lets the next pass retire it; the timestamp is still
        // backdated, so only the refcount was pinning it.
        service
            .worlds()
            .get(0)
            .unwrap()
            .chunks()
            .get(AbsChunkPos::ZERO)
            .unwrap()
            .release();
        wait_for("pinned chunk retired after release", || {
            !service.worlds().get(0).unwrap().is_chunk_loaded(AbsChunkPos::ZERO)
        });
        service.shutdown();

        // The modified chunk was persisted on its way out; untouched ones were not.
        let saved = storage.request_chunk(AbsChunkPos::ZERO).unwrap().expect("modified chunk saved");
        let restored = Chunk::from_blob(AbsChunkPos::ZERO, 0, &saved).unwrap();
        let (_, ipos) = edited.split_chunk_component();
        assert_eq!(restored.get(ipos).id(), 7);
        assert_eq!(storage.len(), 1);
    }
}
