//! Tunnel lifecycle management
//!
//! The peer-to-peer transport primitive is a black box behind the
//! `Transport` trait: expose a local port under an address, or proxy a
//! local port to a remote address. This module owns the lifecycle around
//! it - seed management for stable addresses, bind-then-expose ordering,
//! the connect stabilization delay, and idempotent teardown.

use async_trait::async_trait;
use rand::RngCore;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::{ColloquyError, Result};

/// The transport reports "ready" slightly before it can route traffic;
/// connects wait this long before declaring the client connected.
pub const STABILIZATION_DELAY: Duration = Duration::from_millis(500);

/// Live transport endpoint. `close` must be idempotent and safe to call
/// during or after a failed connect.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Stable address peers use to reach this endpoint
    fn address(&self) -> String;
    async fn close(&self) -> Result<()>;
}

/// P2P transport collaborator
#[async_trait]
pub trait Transport: Send + Sync {
    /// Expose a local port under an address. A seed, when supplied, keeps
    /// the address stable across restarts.
    async fn expose(&self, port: u16, seed: Option<&[u8]>) -> Result<Box<dyn TransportHandle>>;

    /// Proxy a local port to a remote address.
    async fn proxy(&self, address: &str, local_port: u16) -> Result<Box<dyn TransportHandle>>;
}

/// Read the tunnel seed, creating one with restrictive permissions on
/// first run.
pub fn load_or_create_seed(path: &Path) -> Result<Vec<u8>> {
    if let Ok(content) = std::fs::read_to_string(path) {
        let seed = hex::decode(content.trim())
            .map_err(|e| ColloquyError::Transport(format!("corrupt seed file: {e}")))?;
        return Ok(seed);
    }

    let mut seed = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{}\n", hex::encode(&seed)))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    info!("Generated tunnel seed at {}", path.display());
    Ok(seed)
}

/// Pick a free local port by binding an ephemeral listener.
pub async fn find_free_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    Ok(listener.local_addr()?.port())
}

/// A served endpoint: local listener task plus its transport exposure
pub struct TunnelListener {
    address: String,
    port: u16,
    handle: Box<dyn TransportHandle>,
    server: JoinHandle<()>,
}

impl TunnelListener {
    /// Expose an already-bound, already-serving local listener through the
    /// transport. The listener is bound first so the actual port is known.
    pub async fn establish(
        transport: &dyn Transport,
        port: u16,
        seed: Option<&[u8]>,
        server: JoinHandle<()>,
    ) -> Result<Self> {
        let handle = match transport.expose(port, seed).await {
            Ok(handle) => handle,
            Err(e) => {
                // Don't leave an orphaned accept loop behind a dead tunnel
                server.abort();
                return Err(e);
            }
        };
        let address = handle.address();
        info!("Tunnel exposing local port {} as {}", port, address);
        Ok(Self {
            address,
            port,
            handle,
            server,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Close the transport handle before the local listener, awaiting both,
    /// so nothing is served through a half-closed tunnel.
    pub async fn stop(self) -> Result<()> {
        self.handle.close().await?;
        self.server.abort();
        let _ = self.server.await;
        Ok(())
    }
}

/// A client-side tunnel: a local proxy port routed to a remote address
pub struct TunnelConnection {
    local_port: u16,
    handle: Box<dyn TransportHandle>,
    closed: AtomicBool,
}

impl TunnelConnection {
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Base URL for HTTP requests through the proxy
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.local_port)
    }

    /// Idempotent teardown.
    pub async fn disconnect(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.handle.close().await
    }
}

/// Open a local proxy to a remote address and wait for it to stabilize.
pub async fn connect(transport: &dyn Transport, address: &str) -> Result<TunnelConnection> {
    let local_port = find_free_port().await?;
    let handle = transport.proxy(address, local_port).await?;

    // The transport can report ready before it routes traffic
    tokio::time::sleep(STABILIZATION_DELAY).await;
    debug!("Tunnel client ready on 127.0.0.1:{}", local_port);

    Ok(TunnelConnection {
        local_port,
        handle,
        closed: AtomicBool::new(false),
    })
}

/// Loopback transport: exposes endpoints as plain `tcp://host:port`
/// addresses and proxies with a local TCP forwarder. Serves development
/// and tests; real P2P transports implement `Transport` externally.
pub struct DirectTransport;

struct DirectServerHandle {
    address: String,
}

#[async_trait]
impl TransportHandle for DirectServerHandle {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct DirectProxyHandle {
    address: String,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl TransportHandle for DirectProxyHandle {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn close(&self) -> Result<()> {
        if let Some(task) = self.forwarder.lock().unwrap().take() {
            task.abort();
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for DirectTransport {
    async fn expose(&self, port: u16, _seed: Option<&[u8]>) -> Result<Box<dyn TransportHandle>> {
        Ok(Box::new(DirectServerHandle {
            address: format!("tcp://127.0.0.1:{port}"),
        }))
    }

    async fn proxy(&self, address: &str, local_port: u16) -> Result<Box<dyn TransportHandle>> {
        let target = address
            .strip_prefix("tcp://")
            .ok_or_else(|| {
                ColloquyError::Transport(format!("unsupported address for direct transport: {address}"))
            })?
            .to_string();

        let listener = TcpListener::bind(("127.0.0.1", local_port)).await?;
        let forwarder = tokio::spawn(async move {
            loop {
                let Ok((mut inbound, _)) = listener.accept().await else {
                    break;
                };
                let target = target.clone();
                tokio::spawn(async move {
                    match TcpStream::connect(&target).await {
                        Ok(mut outbound) => {
                            let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                        }
                        Err(e) => warn!("Direct transport could not reach {}: {}", target, e),
                    }
                });
            }
        });

        Ok(Box::new(DirectProxyHandle {
            address: address.to_string(),
            forwarder: Mutex::new(Some(forwarder)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn seed_is_created_once_and_reused() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keys").join("tunnel.seed");

        let first = load_or_create_seed(&path).unwrap();
        assert_eq!(first.len(), 32);

        let second = load_or_create_seed(&path).unwrap();
        assert_eq!(first, second);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn corrupt_seed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tunnel.seed");
        std::fs::write(&path, "not hex at all").unwrap();
        assert!(load_or_create_seed(&path).is_err());
    }

    #[tokio::test]
    async fn direct_transport_round_trips_bytes() {
        // Echo server playing the exposed service
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 64];
                    if let Ok(n) = socket.read(&mut buf).await {
                        let _ = socket.write_all(&buf[..n]).await;
                    }
                });
            }
        });

        let transport = DirectTransport;
        let tunnel = TunnelListener::establish(&transport, port, None, server)
            .await
            .unwrap();
        assert_eq!(tunnel.address(), format!("tcp://127.0.0.1:{port}"));

        let connection = connect(&transport, tunnel.address()).await.unwrap();
        let mut stream = TcpStream::connect(("127.0.0.1", connection.local_port()))
            .await
            .unwrap();
        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        connection.disconnect().await.unwrap();
        // Idempotent: a second disconnect is a no-op
        connection.disconnect().await.unwrap();
        tunnel.stop().await.unwrap();
    }

    #[tokio::test]
    async fn proxy_to_unsupported_address_fails_cleanly() {
        let transport = DirectTransport;
        let port = find_free_port().await.unwrap();
        assert!(transport.proxy("hs://deadbeef", port).await.is_err());
    }
}
