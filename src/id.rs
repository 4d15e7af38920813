use std::fmt::Write;

use rand::rngs::OsRng;
use rand::RngCore;

const ID_BYTES: usize = 16;

/// Generate an opaque job/entry identifier: 16 bytes from the OS RNG, hex-encoded.
///
/// If the OS RNG is unavailable the id is derived from the current time instead.
/// Such ids are not guaranteed unique, so the fallback is logged.
pub fn new_id() -> String {
    let mut buf = [0u8; ID_BYTES];
    match OsRng.try_fill_bytes(&mut buf) {
        Ok(()) => to_hex(&buf),
        Err(e) => {
            tracing::warn!("OS randomness unavailable ({}), using time-based id", e);
            fallback_id()
        }
    }
}

fn fallback_id() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    format!("job-{}", nanos)
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
