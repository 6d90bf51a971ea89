use std::hash::Hasher;
use std::io::{self, Read};

use derive_more::Display;
use metrohash::MetroHash64;

const CHUNK_SIZE: usize = 64 * 1024;

/// 64-bit MetroHash of a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{_0:016x}")]
pub struct ContentChecksum(u64);

impl ContentChecksum {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = MetroHash64::default();
        hasher.write(bytes);
        ContentChecksum(hasher.finish())
    }

    /// Hashes everything `reader` yields, in fixed-size chunks.
    pub fn from_reader(mut reader: impl Read) -> io::Result<Self> {
        let mut hasher = MetroHash64::default();
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.write(&buffer[..read]);
        }
        Ok(ContentChecksum(hasher.finish()))
    }
}
