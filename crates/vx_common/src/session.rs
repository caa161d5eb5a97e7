//! A client-side game session: a non-authoritative chunk service mirroring a remote
//! authority's worlds, with streaming, kinematics and render detection wired up for
//! the local observer.

use std::net::SocketAddr;

use tracing::info;
use vx_schemas::coordinates::AbsBlockPos;

use crate::config::GameConfigHandle;
use crate::network::client::RpcAuthorityClient;
use crate::observer::Observer;
use crate::prelude::*;
use crate::render::{ChunkRenderDetectorTask, RenderSink};
use crate::service::ChunkService;
use crate::world::remote::RemoteAuthority;
use crate::world::streamer::{self, StreamingMode};

/// A running client session against a remote authority.
///
/// Establishing a session connects to the authority, mirrors its world list into a
/// local non-authoritative [`ChunkService`] (local numeric ids match the remote ones),
/// registers the streaming and kinematics tasks for the observer in the primary world,
/// and starts the tick engine. Chunk contents then flow in through the remote fetch
/// path as the observer moves.
pub struct ClientSession {
    service: Arc<ChunkService>,
    authority: Arc<RpcAuthorityClient>,
    primary_world: u32,
}

impl ClientSession {
    /// Connects to the authority at `addr` and brings up the mirrored session.
    ///
    /// When a `render_sink` is given, a render detector for the observer is registered
    /// too; the caller then drives [`ChunkService::handle_render_tasks`] from its main
    /// thread.
    pub fn establish(
        addr: SocketAddr,
        config: &GameConfigHandle,
        observer: Arc<Observer>,
        render_sink: Option<Arc<dyn RenderSink>>,
    ) -> Result<Self> {
        let authority = Arc::new(RpcAuthorityClient::connect(addr)?);

        let mut world_ids = authority.get_available_world_ids().wait()?;
        world_ids.sort_unstable();
        ensure!(!world_ids.is_empty(), "The authority serves no worlds");

        let update_threads = config.peek().update_thread_number;
        let service = ChunkService::new_default(false, update_threads);
        {
            let mut worlds = service.worlds_mut();
            for &remote_id in &world_ids {
                let info = authority.get_world_info(remote_id).wait()?;
                let name = info
                    .get("name")
                    .ok_or_else(|| anyhow!("World {remote_id} info is missing the name key"))?;
                let local_id = worlds.create_world(name).id();
                ensure!(
                    local_id == remote_id,
                    "Cannot mirror world {name}: remote id {remote_id} clashes with local id {local_id}"
                );
                info!(world = %name, id = remote_id, "Mirrored remote world");
            }
        }

        let primary_world = world_ids[0];
        streamer::register_observer_tasks(
            &service,
            primary_world,
            &observer,
            config,
            StreamingMode::remote(Arc::clone(&authority) as Arc<dyn RemoteAuthority>),
        );
        if let Some(sink) = render_sink {
            service
                .dispatcher()
                .add_regular_read_task(Arc::new(ChunkRenderDetectorTask::new(
                    primary_world,
                    Arc::clone(&observer),
                    config.clone(),
                    sink,
                )));
        }

        service.start();
        info!(%addr, primary_world, "Client session established");
        Ok(Self {
            service,
            authority,
            primary_world,
        })
    }

    /// The session's chunk service.
    pub fn service(&self) -> &Arc<ChunkService> {
        &self.service
    }

    /// The id of the world the observer lives in.
    pub fn primary_world(&self) -> u32 {
        self.primary_world
    }

    /// Asks the authority to break the addressed block (replace it with air). The
    /// local mirror catches up when the containing chunk is re-fetched or streamed.
    pub fn pick_block(&self, position: AbsBlockPos) -> Deferred<()> {
        self.authority.pick_block(self.primary_world, position)
    }

    /// Tears the session down: tick engine first, then the connection.
    pub fn shutdown(self) {
        self.service.shutdown();
        self.authority.shutdown();
    }
}
