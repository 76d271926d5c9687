//! Pooled database access and session lifecycle.
//!
//! An [`Engine`] wraps a deadpool-postgres pool built from a
//! [`ConnectionConfig`]. A [`Session`] pairs an engine with the optional
//! tunnel it runs through, so both are released together.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use deadpool_postgres::{
    Hook, HookError, Manager, ManagerConfig, Pool, RecyclingMethod, Runtime,
};
use tokio_postgres::NoTls;
use tracing::{error, info};

use crate::error::PgDocError;
use crate::models::{ConnectionConfig, PoolStatus, Route};
use crate::services::ssh_tunnel::{SshTunnelProvisioner, Tunnel, TunnelProvisioner};

/// Loopback address the tunnel listens on.
const TUNNEL_LOCAL_HOST: &str = "127.0.0.1";

/// A validated pool of connections to one database.
pub struct Engine {
    config: Arc<ConnectionConfig>,
    pool: Pool,
    created_at: DateTime<Utc>,
    disposed: bool,
}

impl Engine {
    /// Build the pool and check connectivity with `select 1`.
    ///
    /// Fails with `ConnectionValidation` when the database is unreachable or
    /// rejects the credentials.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, PgDocError> {
        let engine = Self::build(config)?;
        engine.validate().await?;

        info!(
            target = %config.display_target(),
            max_connections = config.pool.max_connections(),
            "Connection pool created"
        );

        Ok(engine)
    }

    /// Build the pool without opening any connection.
    pub fn build(config: &ConnectionConfig) -> Result<Self, PgDocError> {
        let target = config.display_target();
        let connect_timeout = config.options.connect_timeout();

        let mut pg_config: tokio_postgres::Config =
            config.connection_url().parse().map_err(|e| {
                PgDocError::connection_with_source(&target, "Invalid connection settings", e)
            })?;
        pg_config.application_name(&config.options.application_name);
        pg_config.connect_timeout(connect_timeout);
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(60));

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig { recycling_method: recycling_method(config.pool.pre_ping) },
        );

        let recycle = config.pool.recycle;
        let pool = Pool::builder(manager)
            .max_size(config.pool.max_connections())
            .wait_timeout(Some(config.pool.wait_timeout))
            .create_timeout(Some(connect_timeout))
            .recycle_timeout(Some(connect_timeout))
            .runtime(Runtime::Tokio1)
            .pre_recycle(Hook::sync_fn(move |_, metrics| check_age(metrics.age(), recycle)))
            .build()
            .map_err(|e| {
                PgDocError::connection(&target, format!("Failed to create pool: {e}"))
            })?;

        Ok(Self {
            config: Arc::new(config.clone()),
            pool,
            created_at: Utc::now(),
            disposed: false,
        })
    }

    /// Acquire one connection and run `select 1` on it.
    pub async fn validate(&self) -> Result<(), PgDocError> {
        let client = self.get().await?;
        client.execute("select 1", &[]).await.map_err(|e| {
            PgDocError::connection_with_source(
                self.config.display_target(),
                "Connection validation failed",
                e,
            )
        })?;
        Ok(())
    }

    /// The underlying pool.
    pub(crate) fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Acquire a connection, waiting up to the pool's wait timeout.
    pub async fn get(&self) -> Result<deadpool_postgres::Client, PgDocError> {
        self.pool.get().await.map_err(|e| {
            PgDocError::connection(
                self.config.display_target(),
                format!("Failed to acquire connection: {e}"),
            )
        })
    }

    /// The configuration this pool connects with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Per-query timeout, if one is configured.
    pub fn query_timeout(&self) -> Option<Duration> {
        self.config.options.query_timeout()
    }

    /// When the pool was built.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current pool status.
    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available as isize,
            waiting: status.waiting,
        }
    }

    /// Close the pool, dropping all connections.
    pub fn dispose(mut self) {
        self.shutdown();
    }

    /// Check if the pool has been closed.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    fn shutdown(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.pool.close();
        info!(target = %self.config.display_target(), "Connection pool closed");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("target", &self.config.display_target())
            .field("created_at", &self.created_at)
            .field("disposed", &self.disposed)
            .finish()
    }
}

/// Health check run on a pooled connection before it is reused.
fn recycling_method(pre_ping: bool) -> RecyclingMethod {
    if pre_ping {
        RecyclingMethod::Custom("select 1".to_string())
    } else {
        RecyclingMethod::Fast
    }
}

/// Reject connections older than the recycle interval so the pool replaces them.
fn check_age(age: Duration, limit: Duration) -> Result<(), HookError> {
    if age > limit {
        Err(HookError::Message("connection exceeded recycle age".into()))
    } else {
        Ok(())
    }
}

/// How an open session reaches its database.
#[derive(Debug)]
pub enum Link {
    /// Straight to the configured host and port.
    Direct,
    /// Through a local tunnel endpoint.
    Tunneled(Tunnel),
}

impl Link {
    /// The tunnel, when there is one.
    pub fn tunnel(&self) -> Option<&Tunnel> {
        match self {
            Link::Direct => None,
            Link::Tunneled(tunnel) => Some(tunnel),
        }
    }

    /// Stop forwarding, if tunneled.
    pub fn close(self) {
        if let Link::Tunneled(tunnel) = self {
            tunnel.close();
        }
    }
}

/// An engine together with the tunnel it depends on.
///
/// Dropping a session disposes the engine before the tunnel closes.
#[derive(Debug)]
pub struct Session {
    // Field order is drop order: the pool goes before the tunnel under it.
    engine: Engine,
    link: Link,
}

impl Session {
    /// The pooled engine catalog queries run on.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// How the engine reaches the database.
    pub fn link(&self) -> &Link {
        &self.link
    }

    /// The tunnel, when the session is tunneled.
    pub fn tunnel(&self) -> Option<&Tunnel> {
        self.link.tunnel()
    }

    /// Dispose the engine, then close the tunnel.
    pub fn close(self) {
        let Session { engine, link } = self;
        engine.dispose();
        link.close();
    }
}

/// Opens sessions, tunneling first when the route asks for it.
pub struct ConnectionManager<P = SshTunnelProvisioner> {
    provisioner: P,
}

impl ConnectionManager {
    /// Manager that tunnels over SSH.
    pub fn new() -> Self {
        Self { provisioner: SshTunnelProvisioner }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: TunnelProvisioner> ConnectionManager<P> {
    /// Manager with a custom tunnel provisioner.
    pub fn with_provisioner(provisioner: P) -> Self {
        Self { provisioner }
    }

    /// Open a validated session.
    ///
    /// Both configs are validated before any network activity. If the engine
    /// fails after a tunnel was opened, the tunnel is closed before the error
    /// is returned.
    pub async fn connect(
        &self,
        config: &ConnectionConfig,
        route: &Route,
    ) -> Result<Session, PgDocError> {
        config.validate()?;
        if let Route::Tunneled(tunnel_config) = route {
            tunnel_config.validate()?;
        }

        let (effective, link) = match route {
            Route::Direct => (config.clone(), Link::Direct),
            Route::Tunneled(tunnel_config) => {
                let tunnel = self.provisioner.open(tunnel_config).await.inspect_err(|e| {
                    error!(
                        provisioner = self.provisioner.name(),
                        bastion = %tunnel_config.display_target(),
                        error = %e,
                        "Failed to open tunnel"
                    );
                })?;
                let effective = config.via(TUNNEL_LOCAL_HOST, tunnel.local_port());
                (effective, Link::Tunneled(tunnel))
            }
        };

        match Engine::connect(&effective).await {
            Ok(engine) => Ok(Session { engine, link }),
            Err(e) => {
                error!(
                    target = %effective.display_target(),
                    tunneled = route.is_tunneled(),
                    error = %e,
                    "Failed to establish connection"
                );
                link.close();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PoolSettings, TunnelConfig};
    use async_trait::async_trait;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Hands out tunnels that listen nowhere and remembers their close signals.
    #[derive(Default)]
    struct FakeProvisioner {
        opened: AtomicUsize,
        signals: Mutex<Vec<CancellationToken>>,
        fail: bool,
    }

    #[async_trait]
    impl TunnelProvisioner for FakeProvisioner {
        async fn open(&self, config: &TunnelConfig) -> Result<Tunnel, PgDocError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PgDocError::tunnel_with_hint(
                    config.display_target(),
                    "Connection refused",
                    "Check the bastion host",
                ));
            }
            let addr: SocketAddr = format!("127.0.0.1:{}", closed_port()).parse().unwrap();
            let tunnel = Tunnel::new(addr, &config.remote_host, config.remote_port);
            self.signals.lock().unwrap().push(tunnel.close_signal());
            Ok(tunnel)
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn db_config(port: u16) -> ConnectionConfig {
        let mut config = ConnectionConfig::new("127.0.0.1", "app", "reader", "secret").with_port(port);
        config.options.connect_timeout_secs = 2;
        config.pool.wait_timeout = Duration::from_secs(2);
        config
    }

    fn tunnel_route() -> Route {
        Route::Tunneled(TunnelConfig::new("bastion", "ops", "KEY", "db.internal").with_local_port(0))
    }

    #[tokio::test]
    async fn test_empty_password_fails_before_network() {
        let provisioner = FakeProvisioner::default();
        let manager = ConnectionManager::with_provisioner(provisioner);
        let mut config = db_config(5432);
        config.password = String::new();

        let err = manager.connect(&config, &tunnel_route()).await.unwrap_err();
        assert!(matches!(err, PgDocError::Config { .. }));
        assert_eq!(manager.provisioner.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_tunnel_config_fails_before_network() {
        let manager = ConnectionManager::with_provisioner(FakeProvisioner::default());
        let route = Route::Tunneled(TunnelConfig::new("", "ops", "KEY", "db.internal"));

        let err = manager.connect(&db_config(5432), &route).await.unwrap_err();
        assert!(matches!(err, PgDocError::Config { .. }));
        assert_eq!(manager.provisioner.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_direct_connect_to_closed_port() {
        let manager = ConnectionManager::new();
        let err = manager.connect(&db_config(closed_port()), &Route::Direct).await.unwrap_err();
        assert!(matches!(err, PgDocError::ConnectionValidation { .. }));
        assert!(err.is_setup_failure());
    }

    #[tokio::test]
    async fn test_tunnel_closed_when_engine_fails() {
        let manager = ConnectionManager::with_provisioner(FakeProvisioner::default());

        let err = manager.connect(&db_config(5432), &tunnel_route()).await.unwrap_err();
        assert!(matches!(err, PgDocError::ConnectionValidation { .. }));

        let signals = manager.provisioner.signals.lock().unwrap();
        assert_eq!(signals.len(), 1);
        assert!(signals[0].is_cancelled());
    }

    #[tokio::test]
    async fn test_tunnel_failure_yields_no_engine() {
        let provisioner = FakeProvisioner { fail: true, ..Default::default() };
        let manager = ConnectionManager::with_provisioner(provisioner);

        let err = manager.connect(&db_config(5432), &tunnel_route()).await.unwrap_err();
        assert!(matches!(err, PgDocError::TunnelEstablish { .. }));
        assert_eq!(err.hint(), Some("Check the bastion host"));
    }

    #[tokio::test]
    async fn test_engine_build_is_lazy() {
        let config = db_config(closed_port());
        let engine = Engine::build(&config).unwrap();

        let status = engine.status();
        assert_eq!(status.size, 0);
        assert_eq!(status.max_size, config.pool.max_connections());
        assert!(!engine.is_closed());

        engine.dispose();
    }

    #[test]
    fn test_connections_past_recycle_age_are_rejected() {
        let limit = PoolSettings::default().recycle;
        assert_eq!(limit, Duration::from_secs(3600));

        assert!(check_age(Duration::from_secs(10), limit).is_ok());
        assert!(check_age(limit, limit).is_ok());
        assert!(matches!(
            check_age(limit + Duration::from_secs(1), limit),
            Err(HookError::Message(_))
        ));
    }

    #[test]
    fn test_pre_ping_selects_validation_query() {
        assert!(matches!(recycling_method(true), RecyclingMethod::Custom(ref sql) if sql == "select 1"));
        assert!(matches!(recycling_method(false), RecyclingMethod::Fast));
        assert!(PoolSettings::default().pre_ping);
    }

    #[test]
    fn test_link_tunnel_accessor() {
        assert!(Link::Direct.tunnel().is_none());

        let addr: SocketAddr = "127.0.0.1:6543".parse().unwrap();
        let link = Link::Tunneled(Tunnel::new(addr, "db.internal", 5432));
        assert_eq!(link.tunnel().map(Tunnel::local_port), Some(6543));

        let signal = link.tunnel().unwrap().close_signal();
        link.close();
        assert!(signal.is_cancelled());
    }
}
