//! Persist an ordered sequence of items and retrieve any of them by position.
//!
//! # Status
//!
//! `commonware-buffer` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

#![doc(
    html_logo_url = "https://commonware.xyz/imgs/rustdoc_logo.svg",
    html_favicon_url = "https://commonware.xyz/favicon.ico"
)]

pub mod compression;
pub mod file;
mod iter;

pub use iter::Iter;

/// An ordered, append-only collection of items addressed by their position.
///
/// Callers that only need to read, append, or clear items can program against [Buffer] without
/// knowing which concrete implementation backs it.
pub trait Buffer {
    /// The type of item stored in the buffer.
    type Item;

    /// The error returned by mutating operations.
    type Error: std::error::Error;

    /// Return the item at `index`, or `None` if it is not present (or could not be read).
    fn get(&self, index: u64) -> Option<Self::Item>;

    /// Return the number of items in the buffer.
    fn size(&self) -> u64;

    /// Append a single item.
    fn add(&self, item: &Self::Item) -> Result<(), Self::Error>;

    /// Append many items at once.
    fn add_all(&self, items: &[Self::Item]) -> Result<(), Self::Error>;

    /// Remove all items.
    fn reset(&self) -> Result<(), Self::Error>;

    /// Whether the buffer refuses further appends.
    fn is_full(&self) -> bool;

    /// Iterate over items from position 0 until the first missing item.
    fn iter(&self) -> Iter<'_, Self>
    where
        Self: Sized,
    {
        Iter::new(self)
    }
}
