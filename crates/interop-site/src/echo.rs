//! Request handling for the interop site
//!
//! Every request, whatever its path or method, lands on one handler that
//! either echoes the negotiated protocol and method as plain text or, when
//! the `TestMethod=POST` query flag is present, serves the page that makes a
//! browser issue a real POST back to the site.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode, Version},
    response::{IntoResponse, Response},
    Router,
};
use tracing::{debug, warn};

/// Static page returned for POST-flagged requests, relative to the content root
pub const POST_PAGE: &str = "post.html";

/// Query parameter selecting the POST-flavoured behaviour
pub const TEST_METHOD_PARAM: &str = "TestMethod";

#[derive(Debug)]
struct SiteState {
    content_root: PathBuf,
}

/// Build the site router. All routes fall through to the echo handler.
pub fn router(content_root: impl Into<PathBuf>) -> Router {
    let state = Arc::new(SiteState {
        content_root: content_root.into(),
    });

    Router::new().fallback(echo_handler).with_state(state)
}

async fn echo_handler(
    State(state): State<Arc<SiteState>>,
    method: Method,
    version: Version,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    debug!(%method, ?version, "interop request");

    if is_post_flagged(&query) {
        return serve_page(&state, POST_PAGE).await;
    }

    echo_body(version, &method).into_response()
}

/// `Interop {protocol} {method}`
pub fn echo_body(version: Version, method: &Method) -> String {
    format!("Interop {} {}", protocol_name(version), method)
}

/// Render a protocol version the way the interop markers expect it.
pub fn protocol_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP",
    }
}

fn is_post_flagged(query: &HashMap<String, String>) -> bool {
    query
        .get(TEST_METHOD_PARAM)
        .is_some_and(|value| value.eq_ignore_ascii_case("POST"))
}

async fn serve_page(state: &SiteState, name: &str) -> Response {
    let path = state.content_root.join(name);

    match tokio::fs::read(&path).await {
        Ok(contents) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime.essence_str().to_string())],
                contents,
            )
                .into_response()
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "static page not found");
            (StatusCode::NOT_FOUND, "File not found").into_response()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read static page");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!(protocol_name(Version::HTTP_11), "HTTP/1.1");
        assert_eq!(protocol_name(Version::HTTP_2), "HTTP/2");
        assert_eq!(protocol_name(Version::HTTP_10), "HTTP/1.0");
    }

    #[test]
    fn test_echo_body() {
        assert_eq!(echo_body(Version::HTTP_2, &Method::GET), "Interop HTTP/2 GET");
        assert_eq!(
            echo_body(Version::HTTP_11, &Method::POST),
            "Interop HTTP/1.1 POST"
        );
    }

    #[test]
    fn test_post_flag_is_case_insensitive() {
        assert!(is_post_flagged(&query(&[("TestMethod", "POST")])));
        assert!(is_post_flagged(&query(&[("TestMethod", "post")])));
        assert!(is_post_flagged(&query(&[("TestMethod", "PoSt")])));
    }

    #[test]
    fn test_post_flag_requires_exact_param() {
        assert!(!is_post_flagged(&query(&[])));
        assert!(!is_post_flagged(&query(&[("TestMethod", "GET")])));
        assert!(!is_post_flagged(&query(&[("testmethod", "POST")])));
        assert!(!is_post_flagged(&query(&[("TestMethod", "POSTS")])));
    }
}
