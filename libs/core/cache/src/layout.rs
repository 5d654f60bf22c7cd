use std::path::PathBuf;

use sha2::{Digest, Sha256};

/// `<root>/<kind>/<sha256(key)[:2]>/<sha256(key)>.{bin,meta}`
pub(crate) fn hash_key(key: &str) -> String {
    hash_bytes(key.as_bytes())
}

pub(crate) fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

pub(crate) struct EntryPaths {
    pub dir: PathBuf,
    pub data: PathBuf,
    pub meta: PathBuf,
}

pub(crate) fn entry_paths(root: &std::path::Path, kind: &str, key: &str) -> EntryPaths {
    let hash = hash_key(key);
    let dir = root.join(kind).join(&hash[..2]);
    EntryPaths {
        data: dir.join(format!("{hash}.bin")),
        meta: dir.join(format!("{hash}.meta")),
        dir,
    }
}
