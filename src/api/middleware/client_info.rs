//! Caller network information

use actix_web::{http::header::HeaderMap, HttpRequest};
use std::net::{IpAddr, SocketAddr};

/// Extract client IP from request
pub fn extract_client_ip(req: &HttpRequest) -> Option<IpAddr> {
    client_ip_from(req.headers(), req.peer_addr())
}

fn client_ip_from(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    // Try X-Forwarded-For first (for proxied requests)
    if let Some(forwarded) = headers.get("X-Forwarded-For") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            // X-Forwarded-For may contain multiple IPs, take the first (client)
            if let Some(first_ip) = forwarded_str.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                    return Some(ip);
                }
            }
        }
    }

    // Try X-Real-IP
    if let Some(real_ip) = headers.get("X-Real-IP") {
        if let Ok(ip_str) = real_ip.to_str() {
            if let Ok(ip) = ip_str.trim().parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }

    // Fall back to connection info
    peer.map(|addr| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_forwarded_for_wins() {
        let map = headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1"), ("x-real-ip", "10.0.0.2")]);
        let peer = Some("127.0.0.1:9000".parse().unwrap());
        assert_eq!(client_ip_from(&map, peer), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn test_real_ip_used_when_forwarded_for_invalid() {
        let map = headers(&[("x-forwarded-for", "unknown"), ("x-real-ip", "198.51.100.4")]);
        assert_eq!(client_ip_from(&map, None), Some("198.51.100.4".parse().unwrap()));
    }

    #[test]
    fn test_peer_address_fallback() {
        let peer = Some("192.0.2.1:5555".parse().unwrap());
        assert_eq!(client_ip_from(&HeaderMap::new(), peer), Some("192.0.2.1".parse().unwrap()));
        assert_eq!(client_ip_from(&HeaderMap::new(), None), None);
    }
}
