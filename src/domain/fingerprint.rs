use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::domain::value_objects::Fingerprint;

/// Compute the SHA-256 fingerprint of an exported file.
///
/// The file is hashed in fixed-size reads so a 50 MiB part never has to be
/// held in memory. Recorded in the run manifest so an operator can check a
/// copied export before replaying it.
pub fn file_fingerprint(path: &Path) -> io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// Fingerprint of in-memory text (same digest as the file holding it).
pub fn text_fingerprint(text: &str) -> Fingerprint {
    Fingerprint(format!("{:x}", Sha256::digest(text.as_bytes())))
}
