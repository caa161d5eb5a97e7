//! Feeding renderers: detection of dirty chunks and delivery of content snapshots.
//!
//! The engine never talks to a GPU; it hands immutable per-chunk snapshots to a
//! [`RenderSink`] on the main thread's render drain. Detection runs as a regular read
//! task: it picks dirty chunks near the observer whose six neighbours are resident (so
//! meshing can examine shared faces), snapshots their contents during the read phase,
//! and enqueues one render task per snapshot. The dirty bit is consumed by the render
//! task itself, so a chunk keeps being offered until its snapshot actually went out.

use vx_schemas::coordinates::{AbsChunkPos, RelChunkPos};
use vx_schemas::voxel::ChunkBlob;

use crate::config::GameConfigHandle;
use crate::observer::Observer;
use crate::prelude::*;
use crate::scheduler::RegularReadTask;
use crate::service::ChunkService;
use crate::world::World;

/// Upper bound on snapshots emitted by one detector pass.
pub const MAX_CHUNK_RENDERS_PER_PASS: usize = 4;

/// An immutable snapshot of one chunk's contents, ready for meshing.
#[derive(Clone, Debug)]
pub struct ChunkRenderData {
    /// The world the chunk belongs to.
    pub world_id: u32,
    /// The chunk's position.
    pub position: AbsChunkPos,
    /// The chunk contents in wire-blob form (length 1 for a monotone chunk).
    pub blob: ChunkBlob,
}

/// The boundary to the actual renderer: receives chunk snapshots on the main thread.
pub trait RenderSink: Send + Sync + 'static {
    /// Installs (or replaces) the render data of one chunk.
    fn install_chunk(&self, data: ChunkRenderData);
}

fn neighbours_loaded(world: &World, pos: AbsChunkPos) -> bool {
    const DELTAS: [RelChunkPos; 6] = [
        RelChunkPos::new(1, 0, 0),
        RelChunkPos::new(-1, 0, 0),
        RelChunkPos::new(0, 1, 0),
        RelChunkPos::new(0, -1, 0),
        RelChunkPos::new(0, 0, 1),
        RelChunkPos::new(0, 0, -1),
    ];
    DELTAS.iter().all(|&d| world.is_chunk_loaded(pos + d))
}

/// The per-observer regular read task that turns dirty chunks into render snapshots.
pub struct ChunkRenderDetectorTask {
    world_id: u32,
    observer: Arc<Observer>,
    config: GameConfigHandle,
    sink: Arc<dyn RenderSink>,
}

impl ChunkRenderDetectorTask {
    /// Constructs the detector for one world/observer pair, delivering to `sink`.
    pub fn new(world_id: u32, observer: Arc<Observer>, config: GameConfigHandle, sink: Arc<dyn RenderSink>) -> Self {
        Self {
            world_id,
            observer,
            config,
            sink,
        }
    }
}

impl RegularReadTask for ChunkRenderDetectorTask {
    fn run(&self, service: &ChunkService) {
        let render_distance = self.config.peek().gui.render_distance.max(0);
        let center_chunk = AbsChunkPos::from(self.observer.block_position());

        let worlds = service.worlds();
        let Some(world) = worlds.get(self.world_id) else { return };

        let mut emitted = 0;
        for (&pos, chunk) in world.chunks().iter() {
            if !chunk.is_dirty() || (pos - center_chunk).chebyshev() > render_distance {
                continue;
            }
            if !neighbours_loaded(world, pos) {
                continue;
            }
            // Snapshot during the read phase; the render task only hands it over.
            let data = ChunkRenderData {
                world_id: self.world_id,
                position: pos,
                blob: chunk.export(),
            };
            let sink = Arc::clone(&self.sink);
            let world_id = self.world_id;
            service.dispatcher().add_render_task(Box::new(move |svc| {
                {
                    let worlds = svc.worlds();
                    let Some(world) = worlds.get(world_id) else { return };
                    // The chunk may have been retired since detection; drop the
                    // snapshot silently then.
                    let Some(chunk) = world.chunks().get(data.position) else {
                        return;
                    };
                    chunk.take_dirty();
                }
                sink.install_chunk(data);
            }));

            emitted += 1;
            if emitted >= MAX_CHUNK_RENDERS_PER_PASS {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bevy_math::DVec3;
    use vx_schemas::voxel::{BlockData, Chunk};

    use super::*;
    use crate::config::GameConfig;

    #[derive(Default)]
    struct CollectingSink {
        installed: Mutex<Vec<ChunkRenderData>>,
    }

    impl RenderSink for CollectingSink {
        fn install_chunk(&self, data: ChunkRenderData) {
            self.installed.lock().unwrap().push(data);
        }
    }

    fn service_with_cube() -> Arc<ChunkService> {
        // A 3x3x3 cube of chunks: only the middle one has all six neighbours.
        let service = ChunkService::new(true, 1, Duration::from_millis(33));
        let mut worlds = service.worlds_mut();
        let world = worlds.create_world("render");
        for x in -1..=1 {
            for y in -1..=1 {
                for z in -1..=1 {
                    world.insert_chunk_and_update(Chunk::new_built(AbsChunkPos::new(x, y, z), 0, 15));
                }
            }
        }
        drop(worlds);
        service
    }

    #[test]
    fn only_fully_surrounded_dirty_chunks_are_emitted() {
        let service = service_with_cube();
        let sink = Arc::new(CollectingSink::default());
        let detector = ChunkRenderDetectorTask::new(
            0,
            Arc::new(Observer::new(DVec3::ZERO)),
            GameConfig::default().new_handle(),
            Arc::clone(&sink) as Arc<dyn RenderSink>,
        );

        detector.run(&service);
        assert_eq!(service.handle_render_tasks(), 1);
        {
            let installed = sink.installed.lock().unwrap();
            assert_eq!(installed.len(), 1);
            assert_eq!(installed[0].position, AbsChunkPos::ZERO);
            assert_eq!(installed[0].blob, vec![BlockData::new(0, 15, 0)]);
        }

        // The drain consumed the dirty bit, so the next pass emits nothing.
        detector.run(&service);
        assert_eq!(service.handle_render_tasks(), 0);

        // A write dirties the chunk again and re-emits it.
        service
            .worlds_mut()
            .get_mut(0)
            .unwrap()
            .set_block(vx_schemas::coordinates::AbsBlockPos::new(1, 1, 1), BlockData::new(1, 0, 0))
            .unwrap();
        detector.run(&service);
        assert_eq!(service.handle_render_tasks(), 1);
        assert_eq!(sink.installed.lock().unwrap().len(), 2);
    }

    #[test]
    fn per_pass_cap_holds() {
        // A 5x5x5 solid cube leaves a 3x3x3 inner core fully surrounded: 27 dirty
        // candidates drain 4 per pass.
        let service = ChunkService::new(true, 1, Duration::from_millis(33));
        {
            let mut worlds = service.worlds_mut();
            let world = worlds.create_world("capped");
            for x in -2..=2 {
                for y in -2..=2 {
                    for z in -2..=2 {
                        world.insert_chunk_and_update(Chunk::new_built(AbsChunkPos::new(x, y, z), 0, 15));
                    }
                }
            }
        }
        let sink = Arc::new(CollectingSink::default());
        let detector = ChunkRenderDetectorTask::new(
            0,
            Arc::new(Observer::new(DVec3::ZERO)),
            GameConfig::default().new_handle(),
            Arc::clone(&sink) as Arc<dyn RenderSink>,
        );

        detector.run(&service);
        assert_eq!(service.handle_render_tasks(), MAX_CHUNK_RENDERS_PER_PASS);

        // Repeated passes drain the rest.
        let mut total = MAX_CHUNK_RENDERS_PER_PASS;
        for _ in 0..10 {
            detector.run(&service);
            total += service.handle_render_tasks();
        }
        assert_eq!(total, 27);
        assert_eq!(sink.installed.lock().unwrap().len(), 27);
    }
}
