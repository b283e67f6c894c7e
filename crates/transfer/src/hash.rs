use dbxup_protocol::constants::CONTENT_HASH_BLOCK_SIZE;
use sha2::{Digest, Sha256};

/// Incremental computation of the remote content hash.
///
/// The file is cut into 4 MiB blocks, each block is hashed with SHA-256,
/// and the concatenated block digests are hashed once more. Input may be
/// fed in pieces of any size as long as it arrives in file order.
#[derive(Clone, Default)]
pub struct ContentHasher {
    overall: Sha256,
    block: Sha256,
    block_len: usize,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next bytes of the file.
    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let take = (CONTENT_HASH_BLOCK_SIZE - self.block_len).min(data.len());
            self.block.update(&data[..take]);
            self.block_len += take;
            data = &data[take..];

            if self.block_len == CONTENT_HASH_BLOCK_SIZE {
                self.flush_block();
            }
        }
    }

    /// Returns the hex-encoded content hash.
    pub fn finalize(mut self) -> String {
        if self.block_len > 0 {
            self.flush_block();
        }
        hex::encode(self.overall.finalize())
    }

    fn flush_block(&mut self) {
        let digest = std::mem::take(&mut self.block).finalize();
        self.overall.update(digest);
        self.block_len = 0;
    }
}

/// Content hash of an in-memory buffer.
pub fn content_hash_bytes(data: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(data);
    hasher.finalize()
}
