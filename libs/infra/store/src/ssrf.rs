//! SSRF rule set: every URL the store client sends or receives must use
//! `https` and resolve to a host outside loopback, link-local, and
//! RFC1918-private ranges. Resolved hosts are cached (bounded LRU, 60s TTL)
//! so repeated validation of the same host does not re-resolve DNS.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use dossier_domain_codec::UrlGuard;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::instrument;

use crate::error::StoreError;

const DNS_CACHE_CAPACITY: usize = 512;
const DNS_CACHE_TTL: Duration = Duration::from_secs(60);

pub struct SsrfGuard {
    cache: Mutex<LruCache<String, (Vec<IpAddr>, Instant)>>,
}

impl Default for SsrfGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl SsrfGuard {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(DNS_CACHE_CAPACITY).unwrap())),
        }
    }

    #[instrument(skip(self))]
    pub async fn check(&self, url: &str) -> Result<(), StoreError> {
        let parsed = url::Url::parse(url).map_err(|err| StoreError::Validation(format!("unparseable url: {err}")))?;
        if parsed.scheme() != "https" {
            return Err(StoreError::Validation("url scheme must be https".to_string()));
        }
        let host = parsed.host_str().ok_or_else(|| StoreError::Validation("url has no host".to_string()))?;

        let ips = self.resolve(host).await?;
        if ips.is_empty() {
            return Err(StoreError::Validation("url host did not resolve to any address".to_string()));
        }
        if ips.iter().any(|ip| is_blocked(*ip)) {
            return Err(StoreError::Validation("url host resolves to a blocked network range".to_string()));
        }
        Ok(())
    }

    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, StoreError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        if let Some((ips, cached_at)) = self.cache.lock().get(host).cloned() {
            if cached_at.elapsed() < DNS_CACHE_TTL {
                return Ok(ips);
            }
        }

        let lookup = format!("{host}:443");
        let ips: Vec<IpAddr> = tokio::net::lookup_host(lookup)
            .await
            .map_err(|err| StoreError::Transient(format!("dns lookup failed for {host}: {err}")))?
            .map(|addr| addr.ip())
            .collect();

        self.cache.lock().put(host.to_string(), (ips.clone(), Instant::now()));
        Ok(ips)
    }
}

fn is_blocked(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_link_local()
        || ip.is_private()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_v4(v4);
    }
    // fc00::/7 unique local, fe80::/10 link-local.
    let segments = ip.segments();
    (segments[0] & 0xfe00) == 0xfc00 || (segments[0] & 0xffc0) == 0xfe80
}

/// Adapts [`SsrfGuard`] to the codec crate's synchronous [`UrlGuard`]
/// contract using a pre-resolved judgment: the store client resolves hosts
/// up front via [`SsrfGuard::check`] and the codec only ever sees the
/// scheme check, never a live DNS lookup.
pub struct SchemeOnlyGuard;

impl UrlGuard for SchemeOnlyGuard {
    fn check(&self, url: &str) -> Result<(), String> {
        if url.starts_with("https://") {
            Ok(())
        } else {
            Err("scheme must be https".to_string())
        }
    }
}
