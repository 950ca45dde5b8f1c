//! Client address resolution.
//!
//! The forwarding headers consulted here are set by whatever sits in front
//! of the server. They are only trustworthy when that is a reverse proxy
//! under our control which overwrites them; exposed directly, any client can
//! pick its own rate-limit key. Deployment, not this module, owns that
//! trust boundary.

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub const TRUE_CLIENT_IP: &str = "true-client-ip";
pub const X_REAL_IP: &str = "x-real-ip";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolved client address, stored in request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientIp(pub IpAddr);

fn header_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let raw = if let Some(v) = headers.get(TRUE_CLIENT_IP) {
        v.to_str().ok()?.to_string()
    } else if let Some(v) = headers.get(X_REAL_IP) {
        v.to_str().ok()?.to_string()
    } else if let Some(v) = headers.get(X_FORWARDED_FOR) {
        let list = v.to_str().ok()?;
        list.split(',').next().unwrap_or_default().to_string()
    } else {
        return None;
    };

    raw.trim().parse().ok()
}

/// True-Client-IP, then X-Real-IP, then the first X-Forwarded-For entry.
/// The first header present wins even if its value does not parse, in which
/// case the peer address is used.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    header_ip(headers)
        .or_else(|| peer.map(|addr| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

pub async fn real_ip(mut request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = resolve_client_ip(request.headers(), peer);
    request.extensions_mut().insert(ClientIp(ip));
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.9:51000".parse().unwrap())
    }

    #[test]
    fn header_precedence() {
        let all = headers(&[
            (TRUE_CLIENT_IP, "1.1.1.1"),
            (X_REAL_IP, "2.2.2.2"),
            (X_FORWARDED_FOR, "3.3.3.3, 4.4.4.4"),
        ]);
        assert_eq!(resolve_client_ip(&all, peer()), "1.1.1.1".parse::<IpAddr>().unwrap());

        let no_true = headers(&[(X_REAL_IP, "2.2.2.2"), (X_FORWARDED_FOR, "3.3.3.3")]);
        assert_eq!(resolve_client_ip(&no_true, peer()), "2.2.2.2".parse::<IpAddr>().unwrap());

        let xff = headers(&[(X_FORWARDED_FOR, "3.3.3.3, 4.4.4.4")]);
        assert_eq!(resolve_client_ip(&xff, peer()), "3.3.3.3".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn falls_back_to_peer() {
        assert_eq!(resolve_client_ip(&HeaderMap::new(), peer()), "10.0.0.9".parse::<IpAddr>().unwrap());

        let garbage = headers(&[(X_REAL_IP, "not-an-ip")]);
        assert_eq!(resolve_client_ip(&garbage, peer()), "10.0.0.9".parse::<IpAddr>().unwrap());

        assert_eq!(resolve_client_ip(&HeaderMap::new(), None), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn accepts_ipv6() {
        let v6 = headers(&[(TRUE_CLIENT_IP, "2001:db8::1")]);
        assert_eq!(resolve_client_ip(&v6, peer()), "2001:db8::1".parse::<IpAddr>().unwrap());
    }
}
