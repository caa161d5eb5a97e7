//! The authority side of the RPC edge: binds the four protocol methods against a live
//! [`ChunkService`].

use std::net::SocketAddr;
use std::thread::JoinHandle;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, warn};
use vx_schemas::coordinates::AbsChunkPos;
use vx_schemas::voxel::{BlockData, Chunk};

use crate::network::{decode_frame, encode_frame, Request, RequestEnvelope, Response, ResponseEnvelope};
use crate::prelude::*;
use crate::service::ChunkService;

/// The RPC endpoint of an authoritative instance.
///
/// Requests are served on a dedicated tokio runtime whose worker count comes from
/// `server.rpc_thread_number`; world access is bracketed into short lock scopes so the
/// tick engine is never blocked for the duration of a request.
pub struct RpcServer {
    local_addr: SocketAddr,
    shutdown: StdUnboundedSender<()>,
    accept_thread: Option<JoinHandle<()>>,
}

impl RpcServer {
    /// Binds the listen port and starts serving. A port of 0 picks a free port,
    /// retrievable via [`Self::local_addr`].
    pub fn start(service: Arc<ChunkService>, port: u16, worker_threads: usize) -> Result<Self> {
        let listener = std::net::TcpListener::bind(("0.0.0.0", port))
            .with_context(|| format!("Binding the RPC listen port {port}"))?;
        listener.set_nonblocking(true).context("Configuring the RPC listener")?;
        let local_addr = listener.local_addr().context("Reading the RPC listen address")?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .enable_all()
            .thread_name("VX RPC Worker")
            .build()
            .context("Initializing the RPC runtime")?;

        let (shutdown_tx, shutdown_rx) = std_unbounded_channel::<()>();
        let accept_thread = std::thread::Builder::new()
            .name("VX RPC Accept Thread".to_owned())
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match TcpListener::from_std(listener) {
                        Ok(listener) => listener,
                        Err(e) => {
                            warn!("Could not adopt the RPC listener: {e}");
                            return;
                        }
                    };
                    loop {
                        tokio::select! {
                            accepted = listener.accept() => match accepted {
                                Ok((stream, peer)) => {
                                    debug!(%peer, "RPC client connected");
                                    let service = Arc::clone(&service);
                                    tokio::spawn(handle_connection(service, stream));
                                }
                                Err(e) => warn!("RPC accept failed: {e}"),
                            },
                            _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {
                                if shutdown_rx.try_recv().is_ok() {
                                    break;
                                }
                            }
                        }
                    }
                });
                // Dropping the runtime here aborts the per-connection tasks.
            })
            .context("Spawning the RPC accept thread")?;

        info!(%local_addr, "RPC endpoint listening");
        Ok(Self {
            local_addr,
            shutdown: shutdown_tx,
            accept_thread: Some(accept_thread),
        })
    }

    /// The bound listen address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and tears down the RPC runtime.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
        info!("RPC endpoint stopped");
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

async fn handle_connection(service: Arc<ChunkService>, stream: TcpStream) {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    while let Some(frame) = framed.next().await {
        let bytes = match frame {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("RPC read failed: {e}");
                break;
            }
        };
        let envelope: RequestEnvelope = match decode_frame(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Discarding undecodable RPC frame: {e}");
                continue;
            }
        };
        let Some(body) = handle_request(&service, envelope.body) else {
            continue;
        };
        let reply = ResponseEnvelope { id: envelope.id, body };
        match encode_frame(&reply) {
            Ok(bytes) => {
                if let Err(e) = framed.send(bytes).await {
                    warn!("RPC write failed: {e}");
                    break;
                }
            }
            Err(e) => warn!("Could not encode an RPC response: {e}"),
        }
    }
    debug!("RPC client disconnected");
}

/// Serves one request. `None` means the request takes no response (block picking).
fn handle_request(service: &ChunkService, request: Request) -> Option<Response> {
    match request {
        Request::GetChunk { world_id, position } => Some(serve_get_chunk(service, world_id, position)),
        Request::GetAvailableWorldIds => {
            let worlds = service.worlds();
            Some(Response::WorldIds(worlds.iter().map(|w| w.id()).collect()))
        }
        Request::GetWorldInfo { world_id } => {
            let worlds = service.worlds();
            let Some(world) = worlds.get(world_id) else {
                return Some(Response::Error("The world requested does not exist".to_owned()));
            };
            let mut info = std::collections::HashMap::new();
            info.insert("name".to_owned(), world.name().to_owned());
            Some(Response::WorldInfo(info))
        }
        Request::PickBlock { world_id, position } => {
            service.dispatcher().add_write_task(Box::new(move |worlds| {
                let Some(world) = worlds.get_mut(world_id) else { return };
                if let Err(e) = world.set_block(position, BlockData::AIR) {
                    debug!(%position, "Ignoring pick on an unloaded or locked block: {e}");
                }
            }));
            None
        }
    }
}

/// Answers a chunk request, materializing the chunk when it is not loaded yet: the
/// fresh contents are returned immediately and handed to the write phase for insertion.
fn serve_get_chunk(service: &ChunkService, world_id: u32, position: AbsChunkPos) -> Response {
    let daylight = {
        let worlds = service.worlds();
        let Some(world) = worlds.get(world_id) else {
            return Response::Error("The world requested does not exist".to_owned());
        };
        if let Some(chunk) = world.chunks().get(position) {
            chunk.mark_request();
            return Response::Chunk(chunk.export());
        }
        world.daylight_brightness()
    };

    let chunk = Chunk::new_built(position, world_id, daylight);
    let blob = chunk.export();
    service.dispatcher().add_write_task(Box::new(move |worlds| {
        let Some(world) = worlds.get_mut(world_id) else { return };
        if !world.is_chunk_loaded(position) {
            world.insert_chunk_and_update(chunk);
        }
    }));
    Response::Chunk(blob)
}
