#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io failure at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cache metadata corrupted at {path}: {reason}")]
    CorruptMeta { path: String, reason: String },
}
