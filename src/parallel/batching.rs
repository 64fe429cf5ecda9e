//! Input chunking
//!
//! Partitions an input iterator lazily into consecutive batches of at most
//! `chunk_size` items. The last batch may be shorter; empty input yields no
//! batches at all.

use std::iter::Fuse;

use crate::error::Result;

use super::types::validate_chunk_size;

/// Iterator adapter yielding `Vec`s of at most `chunk_size` items
#[derive(Debug)]
pub struct Chunked<It: Iterator> {
    inner: Fuse<It>,
    chunk_size: usize,
}

/// Wrap `items` so that it yields batches of `chunk_size` items
pub fn chunked<It: IntoIterator>(items: It, chunk_size: usize) -> Result<Chunked<It::IntoIter>> {
    validate_chunk_size(chunk_size)?;
    Ok(Chunked {
        inner: items.into_iter().fuse(),
        chunk_size,
    })
}

impl<It: Iterator> Chunked<It> {
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl<It: Iterator> Iterator for Chunked<It> {
    type Item = Vec<It::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut current_batch = Vec::with_capacity(self.chunk_size);
        for item in self.inner.by_ref() {
            current_batch.push(item);
            if current_batch.len() >= self.chunk_size {
                break;
            }
        }

        if current_batch.is_empty() {
            None
        } else {
            Some(current_batch)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lower, upper) = self.inner.size_hint();
        (
            lower.div_ceil(self.chunk_size),
            upper.map(|n| n.div_ceil(self.chunk_size)),
        )
    }
}
