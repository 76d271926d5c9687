//! SSH tunnel provisioning for databases behind a bastion host.
//!
//! A [`Tunnel`] binds a local port and forwards each accepted connection over
//! a `direct-tcpip` channel to the remote database. The forwarding task and
//! any temporary key file live exactly as long as the `Tunnel` value.

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use russh::client;
use russh::Disconnect;
use russh_keys::key::KeyPair;
use tempfile::NamedTempFile;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PgDocError;
use crate::models::TunnelConfig;

/// Opens tunnels. Implemented over SSH by [`SshTunnelProvisioner`].
#[async_trait]
pub trait TunnelProvisioner: Send + Sync {
    /// Open a tunnel and start forwarding.
    ///
    /// Fails with `Config` when parameters are missing and `TunnelEstablish`
    /// when the bastion is unreachable or rejects authentication.
    async fn open(&self, config: &TunnelConfig) -> Result<Tunnel, PgDocError>;

    /// Provisioner name for logging.
    fn name(&self) -> &'static str;
}

/// Private key as handed to the SSH client.
///
/// Inline key content is written to a uniquely named temporary file that is
/// deleted when this value is dropped.
#[derive(Debug)]
pub enum KeyMaterial {
    /// An existing key file supplied by path.
    File(PathBuf),
    /// Key content written to a temporary file.
    Temporary(NamedTempFile),
}

impl KeyMaterial {
    /// Treat `value` as a path if it names an existing file, otherwise as key content.
    pub fn resolve(value: &str) -> Result<Self, PgDocError> {
        let path = Path::new(value);
        if path.is_file() {
            return Ok(Self::File(path.to_path_buf()));
        }

        let mut file = tempfile::Builder::new()
            .prefix("pgdoc-key-")
            .tempfile()
            .map_err(|e| PgDocError::internal(format!("Failed to create key file: {e}")))?;
        file.write_all(value.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| PgDocError::internal(format!("Failed to write key file: {e}")))?;

        tracing::debug!(path = %file.path().display(), "Wrote inline SSH key to temporary file");
        Ok(Self::Temporary(file))
    }

    /// Path the SSH client reads the key from.
    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) => path,
            Self::Temporary(file) => file.path(),
        }
    }

    /// Check if the key lives in a temporary file owned by this value.
    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }
}

/// Handle to an open tunnel.
///
/// Closing (explicitly or by drop) stops the forwarding task and deletes any
/// temporary key file. Closing happens at most once.
pub struct Tunnel {
    id: Uuid,
    local_addr: SocketAddr,
    remote_host: String,
    remote_port: u16,
    cancel_token: CancellationToken,
    key: Option<KeyMaterial>,
    closed: bool,
}

impl Tunnel {
    /// Create a tunnel handle for a forwarder that stops when the returned
    /// handle's cancellation token fires.
    pub fn new(local_addr: SocketAddr, remote_host: impl Into<String>, remote_port: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            local_addr,
            remote_host: remote_host.into(),
            remote_port,
            cancel_token: CancellationToken::new(),
            key: None,
            closed: false,
        }
    }

    fn with_key(mut self, key: KeyMaterial) -> Self {
        self.key = Some(key);
        self
    }

    /// Unique tunnel id used in log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Local address the database is reachable on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Local port the tunnel is listening on.
    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Remote `host:port` being forwarded to.
    pub fn remote_target(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }

    /// Token cancelled when the tunnel closes; forwarders select on it.
    pub fn close_signal(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Check whether the tunnel has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the tunnel.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel_token.cancel();
        // removes a temporary key file
        self.key.take();
        tracing::info!(
            tunnel_id = %self.id,
            local_port = self.local_port(),
            "SSH tunnel closed"
        );
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("id", &self.id)
            .field("local_addr", &self.local_addr)
            .field("remote", &self.remote_target())
            .field("closed", &self.closed)
            .finish()
    }
}

/// SSH client handler for russh.
struct SshClientHandler;

#[async_trait]
impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // TODO: verify against known_hosts once a host key can be configured
        Ok(true)
    }
}

type SshHandle = Arc<Mutex<client::Handle<SshClientHandler>>>;

/// Tunnel provisioner backed by russh with public key authentication.
#[derive(Debug, Default, Clone, Copy)]
pub struct SshTunnelProvisioner;

#[async_trait]
impl TunnelProvisioner for SshTunnelProvisioner {
    async fn open(&self, config: &TunnelConfig) -> Result<Tunnel, PgDocError> {
        config.validate()?;
        let target = config.display_target();

        tracing::info!(
            bastion = %target,
            remote = %format!("{}:{}", config.remote_host, config.remote_port),
            "Establishing SSH tunnel"
        );

        let key = KeyMaterial::resolve(&config.private_key)?;
        let handle = Self::connect_ssh(config, &key).await?;
        let handle = Arc::new(Mutex::new(handle));

        let listener = TcpListener::bind(("127.0.0.1", config.local_port)).await.map_err(|e| {
            PgDocError::tunnel_with_hint(
                &target,
                format!("Failed to bind local port {}: {e}", config.local_port),
                "Choose a different LOCAL_PORT or use 0 to pick a free one",
            )
        })?;
        let local_addr = listener.local_addr().map_err(|e| {
            PgDocError::tunnel_with_source(&target, "Failed to read local tunnel address", e)
        })?;

        let tunnel = Tunnel::new(local_addr, &config.remote_host, config.remote_port).with_key(key);

        tokio::spawn(run_tunnel(
            listener,
            handle,
            config.remote_host.clone(),
            config.remote_port,
            tunnel.id(),
            tunnel.close_signal(),
        ));

        tracing::info!(
            tunnel_id = %tunnel.id(),
            bastion = %target,
            local_port = tunnel.local_port(),
            "SSH tunnel established"
        );
        Ok(tunnel)
    }

    fn name(&self) -> &'static str {
        "ssh"
    }
}

impl SshTunnelProvisioner {
    /// Connect and authenticate to the bastion.
    async fn connect_ssh(
        config: &TunnelConfig,
        key: &KeyMaterial,
    ) -> Result<client::Handle<SshClientHandler>, PgDocError> {
        let target = config.display_target();
        let ssh_config = Arc::new(client::Config::default());

        let connect = client::connect(
            ssh_config,
            (config.ssh_host.as_str(), config.ssh_port),
            SshClientHandler,
        );
        let mut handle = tokio::time::timeout(config.connect_timeout(), connect)
            .await
            .map_err(|_| {
                PgDocError::tunnel_with_hint(
                    &target,
                    format!("Timed out after {}s connecting to SSH server", config.connect_timeout_secs),
                    "Verify the bastion host is reachable from this machine",
                )
            })?
            .map_err(|e| {
                PgDocError::tunnel_with_source(&target, "Failed to connect to SSH server", e)
            })?;

        let key_pair = Self::load_private_key(&target, key, config.key_passphrase.as_deref())?;

        let authenticated = handle
            .authenticate_publickey(&config.ssh_username, key_pair)
            .await
            .map_err(|e| PgDocError::tunnel_with_source(&target, "SSH key authentication failed", e))?;

        if !authenticated {
            return Err(PgDocError::tunnel_with_hint(
                &target,
                "SSH authentication rejected",
                "Check that the key is authorized for this user on the bastion",
            ));
        }

        tracing::debug!(bastion = %target, "SSH authentication successful");
        Ok(handle)
    }

    fn load_private_key(
        target: &str,
        key: &KeyMaterial,
        passphrase: Option<&str>,
    ) -> Result<Arc<KeyPair>, PgDocError> {
        russh_keys::load_secret_key(key.path(), passphrase).map(Arc::new).map_err(|e| {
            PgDocError::tunnel_with_hint(
                target,
                format!("Failed to load SSH key: {e}"),
                "Provide a key file path or the full key content; encrypted keys need a passphrase",
            )
        })
    }
}

/// Accept local connections until the tunnel is cancelled.
async fn run_tunnel(
    listener: TcpListener,
    ssh: SshHandle,
    remote_host: String,
    remote_port: u16,
    tunnel_id: Uuid,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((local_stream, peer_addr)) => {
                        tracing::debug!(tunnel_id = %tunnel_id, %peer_addr, "New tunnel connection");
                        let ssh = ssh.clone();
                        let remote_host = remote_host.clone();
                        let cancel = cancel_token.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                forward_connection(local_stream, ssh, &remote_host, remote_port, cancel).await
                            {
                                tracing::warn!(tunnel_id = %tunnel_id, error = %e, "Tunnel forwarding error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(tunnel_id = %tunnel_id, error = %e, "Failed to accept tunnel connection");
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                break;
            }
        }
    }

    let handle = ssh.lock().await;
    if let Err(e) = handle.disconnect(Disconnect::ByApplication, "tunnel closed", "en").await {
        tracing::debug!(tunnel_id = %tunnel_id, error = %e, "SSH disconnect failed");
    }
}

/// Forward a single connection through a `direct-tcpip` channel.
async fn forward_connection(
    mut local_stream: TcpStream,
    ssh: SshHandle,
    remote_host: &str,
    remote_port: u16,
    cancel_token: CancellationToken,
) -> Result<(), russh::Error> {
    let channel = {
        let handle = ssh.lock().await;
        handle
            .channel_open_direct_tcpip(remote_host, u32::from(remote_port), "127.0.0.1", 0)
            .await?
    };
    let mut remote_stream = channel.into_stream();

    tokio::select! {
        copied = tokio::io::copy_bidirectional(&mut local_stream, &mut remote_stream) => {
            if let Ok((up, down)) = copied {
                tracing::trace!(bytes_up = up, bytes_down = down, "Tunnel connection finished");
            }
        }
        _ = cancel_token.cancelled() => {}
    }
    Ok(())
}
