//! The site's readiness line as the deployer reads it

use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::time::Duration;

use interop_harness::address::loopback_uri;
use interop_harness::deployment::{parse_ready_line, READY_PREFIX};
use interop_site::SiteConfig;

#[test]
fn both_sides_agree_on_the_prefix() {
    assert_eq!(READY_PREFIX, interop_site::READY_PREFIX);
}

#[tokio::test]
async fn deployer_understands_the_site_ready_line() {
    let site = interop_site::start(SiteConfig {
        content_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")),
        shutdown_grace: Duration::from_secs(1),
        ..Default::default()
    })
    .await
    .expect("start interop site");

    let bound = parse_ready_line(&site.ready_line())
        .expect("readiness line recognised")
        .expect("readiness address parses");
    assert_eq!(bound.port(), Some(site.local_addr().port()));

    // The wildcard bind must be reachable at the address the verifier is given.
    let uri = loopback_uri(&bound);
    assert_eq!(uri.host_str(), Some("127.0.0.1"));
    let addr = SocketAddr::from(([127, 0, 0, 1], site.local_addr().port()));
    assert!(TcpStream::connect_timeout(&addr, Duration::from_secs(2)).is_ok());

    site.shutdown();
    site.wait().await.unwrap();
}
