//! The client side of the authority RPC connection.
//!
//! One dedicated thread owns the TCP connection and a current-thread tokio runtime.
//! Callers hand it commands over a channel; the connection loop writes request frames,
//! matches response frames back to callers by correlation id, and fails everything in
//! flight when the connection drops. There is no per-request task: four small methods
//! do not need more machinery than a single select loop.

use std::net::SocketAddr;
use std::thread::JoinHandle;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, warn};
use vx_schemas::coordinates::{AbsBlockPos, AbsChunkPos};
use vx_schemas::voxel::ChunkBlob;

use crate::network::{decode_frame, encode_frame, NetworkError, Request, RequestEnvelope, Response, ResponseEnvelope};
use crate::prelude::*;
use crate::world::remote::RemoteAuthority;

/// Invoked on the connection thread with the correlated response (or the failure).
type ReplyFn = Box<dyn FnOnce(Result<Response>) + Send>;

enum Command {
    /// Send a request and route its response to the callback.
    Call { body: Request, reply: ReplyFn },
    /// Send a request that the authority never answers (block picking).
    SendOnly { body: Request },
    /// Flush out, acknowledge, and close the connection.
    Shutdown(AsyncOneshotSender<()>),
}

/// A connection to a remote authority, usable from any thread.
///
/// Every method enqueues a command for the connection thread and returns a
/// [`Deferred`] that resolves when the correlated response frame arrives; calls do not
/// wait on each other.
pub struct RpcAuthorityClient {
    commands: AsyncUnboundedSender<Command>,
    io_thread: Mutex<Option<JoinHandle<()>>>,
}

impl RpcAuthorityClient {
    /// Connects to the authority, blocking until the TCP connection is established.
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        let (command_tx, command_rx) = async_unbounded_channel();
        let (ready_tx, ready_rx) = std_bounded_channel(1);
        let io_thread = std::thread::Builder::new()
            .name("VX Client Network Thread".to_owned())
            .spawn(move || connection_thread_main(addr, command_rx, ready_tx))
            .context("Spawning the client network thread")?;
        ready_rx
            .recv()
            .context("Client network thread exited before reporting its connection status")??;
        Ok(Self {
            commands: command_tx,
            io_thread: Mutex::new(Some(io_thread)),
        })
    }

    /// Closes the connection and waits for the connection thread to exit.
    pub fn shutdown(&self) {
        let (tx, rx) = async_oneshot_channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.blocking_recv();
        }
        if let Some(handle) = self.io_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn call<T, M>(&self, body: Request, map: M) -> Deferred<T>
    where
        T: Send + 'static,
        M: FnOnce(Response) -> Result<T> + Send + 'static,
    {
        let (deferred, resolver) = Deferred::pair();
        let reply: ReplyFn = Box::new(move |response| {
            let _ = resolver.send(response.and_then(map));
        });
        if self.commands.send(Command::Call { body, reply }).is_err() {
            return Deferred::failed(NetworkError::ConnectionClosed.into());
        }
        deferred
    }
}

impl RemoteAuthority for RpcAuthorityClient {
    fn get_chunk(&self, world_id: u32, position: AbsChunkPos) -> Deferred<ChunkBlob> {
        self.call(Request::GetChunk { world_id, position }, |response| match response {
            Response::Chunk(blob) => Ok(blob),
            Response::Error(message) => Err(NetworkError::Remote(message).into()),
            _ => Err(NetworkError::UnexpectedResponse.into()),
        })
    }

    fn get_available_world_ids(&self) -> Deferred<Vec<u32>> {
        self.call(Request::GetAvailableWorldIds, |response| match response {
            Response::WorldIds(ids) => Ok(ids),
            Response::Error(message) => Err(NetworkError::Remote(message).into()),
            _ => Err(NetworkError::UnexpectedResponse.into()),
        })
    }

    fn get_world_info(&self, world_id: u32) -> Deferred<HashMap<String, String>> {
        self.call(Request::GetWorldInfo { world_id }, |response| match response {
            Response::WorldInfo(info) => Ok(info.into_iter().collect()),
            Response::Error(message) => Err(NetworkError::Remote(message).into()),
            _ => Err(NetworkError::UnexpectedResponse.into()),
        })
    }

    fn pick_block(&self, world_id: u32, position: AbsBlockPos) -> Deferred<()> {
        let body = Request::PickBlock { world_id, position };
        if self.commands.send(Command::SendOnly { body }).is_err() {
            return Deferred::failed(NetworkError::ConnectionClosed.into());
        }
        Deferred::ready(())
    }
}

fn connection_thread_main(
    addr: SocketAddr,
    commands: AsyncUnboundedReceiver<Command>,
    ready: StdBoundedSender<Result<()>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(anyhow::Error::from(e).context("Initializing the client network runtime")));
            return;
        }
    };
    runtime.block_on(async move {
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready.send(Err(
                    anyhow::Error::from(e).context(format!("Connecting to the authority at {addr}"))
                ));
                return;
            }
        };
        debug!(%addr, "Connected to the authority");
        let _ = ready.send(Ok(()));
        drive_connection(Framed::new(stream, LengthDelimitedCodec::new()), commands).await;
    });
    debug!("Client network thread exited");
}

/// The connection loop: interleaves outgoing commands with incoming response frames
/// until the connection drops, a shutdown arrives, or every client handle is gone.
async fn drive_connection(mut framed: Framed<TcpStream, LengthDelimitedCodec>, mut commands: AsyncUnboundedReceiver<Command>) {
    let mut pending: HashMap<u64, ReplyFn> = HashMap::new();
    let mut next_request_id = 0u64;

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                let (envelope, reply) = match command {
                    Command::Call { body, reply } => {
                        let id = next_request_id;
                        next_request_id += 1;
                        (RequestEnvelope { id, body }, Some((id, reply)))
                    }
                    Command::SendOnly { body } => {
                        let id = next_request_id;
                        next_request_id += 1;
                        (RequestEnvelope { id, body }, None)
                    }
                    Command::Shutdown(ack) => {
                        let _ = ack.send(());
                        break;
                    }
                };
                let frame = match encode_frame(&envelope) {
                    Ok(frame) => frame,
                    Err(e) => {
                        if let Some((_, reply)) = reply {
                            reply(Err(e.into()));
                        }
                        continue;
                    }
                };
                if let Some((id, reply)) = reply {
                    pending.insert(id, reply);
                }
                if let Err(e) = framed.send(frame).await {
                    warn!("Authority connection write failed: {e}");
                    break;
                }
            }
            frame = framed.next() => {
                let bytes = match frame {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        warn!("Authority connection read failed: {e}");
                        break;
                    }
                    None => {
                        debug!("Authority closed the connection");
                        break;
                    }
                };
                let envelope: ResponseEnvelope = match decode_frame(&bytes) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!("Discarding undecodable authority frame: {e}");
                        continue;
                    }
                };
                match pending.remove(&envelope.id) {
                    Some(reply) => reply(Ok(envelope.body)),
                    None => debug!(id = envelope.id, "Response for an unknown request id"),
                }
            }
        }
    }

    // Whatever ended the loop, nothing in flight can be answered anymore.
    commands.close();
    for (_, reply) in pending.drain() {
        reply(Err(NetworkError::ConnectionClosed.into()));
    }
}
