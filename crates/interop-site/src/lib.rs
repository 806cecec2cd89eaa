//! Interop test site
//!
//! The application the interop harness deploys: an HTTPS listener that
//! negotiates HTTP/1.1 or HTTP/2 over ALPN and answers every request with
//! `Interop {protocol} {method}`, or with `post.html` when the request
//! carries `TestMethod=POST`.
//!
//! When run as a binary the site prints a single readiness line to stdout
//! once bound:
//!
//! ```text
//! Now listening on: https://[::]:43127
//! ```

pub mod echo;
pub mod tls;

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::time::Duration;

use axum_server::Handle;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use echo::router;
pub use tls::SelfSignedCert;

/// Prefix of the readiness line written to stdout
pub const READY_PREFIX: &str = "Now listening on: ";

/// Site configuration
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Address to bind; port 0 asks the OS for an ephemeral port
    pub bind: SocketAddr,

    /// Directory `post.html` is served from
    pub content_root: PathBuf,

    /// How long in-flight connections get on shutdown
    pub shutdown_grace: Duration,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
            content_root: PathBuf::from("."),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// A bound, serving site
pub struct RunningSite {
    handle: Handle,
    local_addr: SocketAddr,
    shutdown_grace: Duration,
    task: JoinHandle<io::Result<()>>,
}

impl RunningSite {
    /// Address the listener is actually bound to (may be a wildcard)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL as bound, e.g. `https://[::]:43127`
    pub fn base_url(&self) -> String {
        format!("https://{}", self.local_addr)
    }

    /// Readiness line announced on stdout by the binary
    pub fn ready_line(&self) -> String {
        format!("{}{}", READY_PREFIX, self.base_url())
    }

    /// Server handle, for triggering shutdown from another task
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Begin graceful shutdown
    pub fn shutdown(&self) {
        self.handle.graceful_shutdown(Some(self.shutdown_grace));
    }

    /// Wait until the server stops
    pub async fn wait(self) -> anyhow::Result<()> {
        self.task.await??;
        Ok(())
    }
}

/// Bind the listener and start serving in a background task.
pub async fn start(config: SiteConfig) -> anyhow::Result<RunningSite> {
    let cert = SelfSignedCert::generate(tls::CERT_NAMES)?;
    let rustls = cert.rustls_config().await?;

    let listener = bind_listener(config.bind)?;
    let local_addr = listener.local_addr()?;

    info!(
        address = %local_addr,
        content_root = %config.content_root.display(),
        "Interop site listening (h2, http/1.1)"
    );

    let handle = Handle::new();
    let app = router(config.content_root);
    let server = axum_server::tls_rustls::from_tcp_rustls(listener, rustls).handle(handle.clone());
    let task = tokio::spawn(async move { server.serve(app.into_make_service()).await });

    Ok(RunningSite {
        handle,
        local_addr,
        shutdown_grace: config.shutdown_grace,
        task,
    })
}

/// Bind `addr`; a failed IPv6 wildcard bind retries on the IPv4 wildcard.
fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    match bind_socket(addr) {
        Ok(listener) => Ok(listener),
        Err(e) if addr.ip() == IpAddr::V6(Ipv6Addr::UNSPECIFIED) => {
            warn!(error = %e, "IPv6 wildcard bind failed, falling back to 0.0.0.0");
            bind_socket(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), addr.port()))
        }
        Err(e) => Err(e),
    }
}

/// Non-blocking listener on `addr`. IPv6 sockets are dual-stack regardless of
/// the OS default (`IPV6_V6ONLY` is on for Windows and `bindv6only=1` hosts),
/// so `[::]` also accepts IPv4 clients on `127.0.0.1`.
fn bind_socket(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binds_ipv6_wildcard_ephemeral() {
        let config = SiteConfig::default();
        assert_eq!(config.bind.ip(), IpAddr::V6(Ipv6Addr::UNSPECIFIED));
        assert_eq!(config.bind.port(), 0);
    }

    #[test]
    fn test_bind_listener_gets_ephemeral_port() {
        let listener = bind_listener(SiteConfig::default().bind).unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_unspecified());
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn test_wildcard_listener_accepts_ipv4_loopback() {
        let listener = bind_listener(SiteConfig::default().bind).unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = std::net::TcpStream::connect_timeout(
            &SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
            Duration::from_secs(2),
        );
        assert!(client.is_ok(), "127.0.0.1:{port} refused: {client:?}");
    }

    #[test]
    fn test_ipv6_socket_is_dual_stack() {
        let addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0);
        // Hosts without IPv6 fall back to IPv4 in bind_listener instead.
        let Ok(listener) = bind_socket(addr) else {
            return;
        };
        let socket = Socket::from(listener);
        assert!(!socket.only_v6().unwrap());
    }

    #[tokio::test]
    async fn test_ready_line_format() {
        let site = start(SiteConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        })
        .await
        .unwrap();

        let line = site.ready_line();
        assert!(line.starts_with("Now listening on: https://127.0.0.1:"));
        assert!(!line.ends_with(":0"));

        site.shutdown();
        site.wait().await.unwrap();
    }
}
