use axum::http::{
    header::{ACCEPT_ENCODING, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, HOST},
    HeaderMap, HeaderName, HeaderValue,
};
use tracing::debug;

/// Connection-scoped headers that never cross the gateway in either direction.
pub const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName, connection_tokens: &[String]) -> bool {
    let name = name.as_str();
    HOP_BY_HOP_HEADERS.contains(&name) || connection_tokens.iter().any(|t| t == name)
}

/// Extra hop-by-hop names announced in the `Connection` header.
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Builds the outbound header set for an upstream request.
///
/// Every inbound header is copied into a fresh map (multi-valued headers keep
/// all their values) except hop-by-hop headers, `content-length`, which the
/// client recomputes from the forwarded body, and `accept-encoding`, which the
/// client negotiates and decodes itself. `Host` is set last to the upstream
/// authority.
pub fn forward_headers(inbound: &HeaderMap, authority: &HeaderValue) -> HeaderMap {
    let tokens = connection_tokens(inbound);
    let mut headers = HeaderMap::with_capacity(inbound.len() + 1);

    for (name, value) in inbound {
        if is_hop_by_hop(name, &tokens) || name == CONTENT_LENGTH || name == ACCEPT_ENCODING {
            debug!(header = %name, "Dropping header from forwarded request");
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    headers.insert(HOST, authority.clone());
    headers
}

/// Upstream response headers safe to hand back to the caller. Framing headers
/// are rebuilt by the server, the body has already been decoded, and CORS
/// headers belong to the gateway's own policy.
pub fn relay_headers(upstream: &HeaderMap) -> HeaderMap {
    let tokens = connection_tokens(upstream);
    let mut headers = HeaderMap::with_capacity(upstream.len());

    for (name, value) in upstream {
        if is_hop_by_hop(name, &tokens)
            || name == CONTENT_LENGTH
            || name == CONTENT_ENCODING
            || name.as_str().starts_with("access-control-")
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    headers
}
