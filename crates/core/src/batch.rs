//! Chunk planning for bulk writes.

/// The store accepts at most this many write requests per `BatchWriteItem`.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Splits `items` into consecutive chunks of at most `chunk_size` elements.
///
/// A `chunk_size` of zero is clamped to one. An empty input yields no chunks.
pub fn plan_chunks<T>(items: &[T], chunk_size: usize) -> Vec<&[T]> {
    items.chunks(chunk_size.max(1)).collect()
}

/// Number of batch requests needed for `total` items.
pub fn chunk_count(total: usize, chunk_size: usize) -> usize {
    total.div_ceil(chunk_size.max(1))
}
