use crate::Buffer;
use std::iter::FusedIterator;

/// Lazy iterator over the items of a [Buffer].
///
/// Nothing is captured up front: each step asks the buffer for the next position, so items
/// appended while iterating are observed. Iteration ends at the first position for which
/// [Buffer::get] returns `None`. Calling [Buffer::iter] again restarts from position 0.
pub struct Iter<'a, B: Buffer> {
    buffer: &'a B,
    next: u64,
    done: bool,
}

impl<'a, B: Buffer> Iter<'a, B> {
    /// Create an iterator positioned at the first item of `buffer`.
    pub fn new(buffer: &'a B) -> Self {
        Self {
            buffer,
            next: 0,
            done: false,
        }
    }

    /// Position of the next item to be returned.
    pub fn position(&self) -> u64 {
        self.next
    }
}

impl<B: Buffer> Iterator for Iter<'_, B> {
    type Item = B::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.buffer.get(self.next) {
            Some(item) => {
                self.next += 1;
                Some(item)
            }
            None => {
                self.done = true;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }

        // The buffer's size bounds nothing: an unreadable item ends iteration early and
        // concurrent appends extend it.
        (0, None)
    }
}

impl<B: Buffer> FusedIterator for Iter<'_, B> {}
