/// Judgment call on whether a URL is safe to send or accept, without the
/// codec crate itself doing any DNS resolution or networking. The store
/// client owns the actual SSRF host-range checks (see `dossier-infra-store`);
/// this trait lets the codec call into that judgment as a pure function.
pub trait UrlGuard: Send + Sync {
    /// Returns `Ok(())` if `url` is safe to transmit: `https` scheme and a
    /// host that does not resolve into a blocked range. `Err(reason)`
    /// otherwise, with a short human-readable reason (no raw URLs with
    /// credentials, no internal paths).
    fn check(&self, url: &str) -> Result<(), String>;
}

/// A guard that accepts any well-formed `https` URL without resolving the
/// host. Used by tests and by callers that perform SSRF checks themselves
/// at a different layer.
pub struct AllowAllUrlGuard;

impl UrlGuard for AllowAllUrlGuard {
    fn check(&self, url: &str) -> Result<(), String> {
        if url.starts_with("https://") {
            Ok(())
        } else {
            Err("scheme must be https".to_string())
        }
    }
}
