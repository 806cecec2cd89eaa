//! Site behaviour over real TLS connections
//!
//! `reqwest` is an independent client here: it offers `h2` and `http/1.1`
//! over ALPN, so these tests check the same negotiation a browser performs.

use std::path::PathBuf;
use std::time::Duration;

use interop_site::{RunningSite, SiteConfig};
use reqwest::{StatusCode, Version};

async fn start_site(content_root: PathBuf) -> RunningSite {
    interop_site::start(SiteConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        content_root,
        shutdown_grace: Duration::from_secs(1),
    })
    .await
    .expect("start interop site")
}

fn site_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap()
}

#[tokio::test]
async fn get_negotiates_h2_and_echoes() {
    let site = start_site(site_dir()).await;

    let resp = client().get(site.base_url()).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.version(), Version::HTTP_2);
    assert_eq!(resp.text().await.unwrap(), "Interop HTTP/2 GET");

    site.shutdown();
    site.wait().await.unwrap();
}

#[tokio::test]
async fn post_is_echoed_on_any_path() {
    let site = start_site(site_dir()).await;

    let url = format!("{}/some/path", site.base_url());
    let resp = client().post(url).body("origin=test").send().await.unwrap();
    assert_eq!(resp.version(), Version::HTTP_2);
    assert_eq!(resp.text().await.unwrap(), "Interop HTTP/2 POST");

    site.shutdown();
    site.wait().await.unwrap();
}

#[tokio::test]
async fn http1_client_falls_back_to_http11() {
    let site = start_site(site_dir()).await;

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .http1_only()
        .build()
        .unwrap();
    let resp = client.get(site.base_url()).send().await.unwrap();
    assert_eq!(resp.version(), Version::HTTP_11);
    assert_eq!(resp.text().await.unwrap(), "Interop HTTP/1.1 GET");

    site.shutdown();
    site.wait().await.unwrap();
}

#[tokio::test]
async fn post_flag_serves_auto_submitting_page() {
    let site = start_site(site_dir()).await;

    for flag in ["POST", "post"] {
        let url = format!("{}/?TestMethod={}", site.base_url(), flag);
        let resp = client().get(url).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert_eq!(content_type, "text/html");

        let body = resp.text().await.unwrap();
        assert!(body.contains(r#"<form method="post" action="/">"#), "{body}");
    }

    site.shutdown();
    site.wait().await.unwrap();
}

#[tokio::test]
async fn post_flag_without_page_is_not_found() {
    let empty = tempfile::tempdir().unwrap();
    let site = start_site(empty.path().to_path_buf()).await;

    let url = format!("{}/?TestMethod=POST", site.base_url());
    let resp = client().get(url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    site.shutdown();
    site.wait().await.unwrap();
}

#[tokio::test]
async fn other_test_method_values_echo() {
    let site = start_site(site_dir()).await;

    let url = format!("{}/?TestMethod=PUT", site.base_url());
    let resp = client().get(url).send().await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "Interop HTTP/2 GET");

    site.shutdown();
    site.wait().await.unwrap();
}
