/// One contiguous byte range of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chunk {
    /// Byte offset within the file.
    pub offset: u64,
    /// Number of bytes in the range (never zero).
    pub length: u64,
}

impl Chunk {
    /// Offset one past the last byte of this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}
