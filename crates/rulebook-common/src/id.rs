/// Opaque identifiers for chat responses and history turns.
///
/// A bot turn reuses the id of the `ChatResponse` it records, so a client can match an
/// answer to its history entry. Ids are the first 16 bytes of a SHA-256 over the wall
/// clock, the process id and a process-wide counter, rendered as 32 lowercase hex chars;
/// they are unique within a deployment but carry no ordering or meaning.
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

static NEXT: AtomicU64 = AtomicU64::new(0);

pub fn new_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let digest = Sha256::new()
        .chain_update(nanos.to_le_bytes())
        .chain_update(std::process::id().to_le_bytes())
        .chain_update(NEXT.fetch_add(1, Ordering::Relaxed).to_le_bytes())
        .finalize();

    digest[..16].iter().fold(String::with_capacity(32), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
