//! Arena-based storage with typed handles.
//!
//! Unlike a pure append-only arena, slots can be released. A released slot
//! is tombstoned and never reused, so a stale handle can be detected instead
//! of silently aliasing a newer value.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A typed handle into an [`Arena`].
///
/// Handles are lightweight identifiers (u32 index) that provide
/// type-safe access to arena-allocated values.
pub struct Handle<T> {
    index: u32,
    _phantom: PhantomData<T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.index)
    }
}

impl<T> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.index)
    }
}

impl<T> Handle<T> {
    /// Creates a new handle from a zero-based index.
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            _phantom: PhantomData,
        }
    }

    /// Returns the zero-based index of this handle.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// An arena with typed [`Handle`]-based access and tombstoned release.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    data: Vec<Option<T>>,
    live: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            live: 0,
        }
    }

    /// Returns the number of slots ever allocated, live or released.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no slot was ever allocated.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the number of values that have not been released.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Appends a value and returns its handle.
    pub fn append(&mut self, value: T) -> Handle<T> {
        let index = u32::try_from(self.data.len()).unwrap_or_else(|_| {
            panic!("arena overflow: {} items exceeds u32::MAX", self.data.len())
        });
        self.data.push(Some(value));
        self.live += 1;
        Handle::new(index)
    }

    /// Releases the value behind `handle`, returning it.
    ///
    /// Returns `None` if the handle is out of bounds or already released.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let value = self.data.get_mut(handle.index())?.take()?;
        self.live -= 1;
        Some(value)
    }

    /// Returns `true` if `handle` refers to a live value.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        matches!(self.data.get(handle.index()), Some(Some(_)))
    }

    /// Returns a reference to the value if the handle is live.
    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.data.get(handle.index())?.as_ref()
    }

    /// Returns a mutable reference to the value if the handle is live.
    pub fn try_get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.data.get_mut(handle.index())?.as_mut()
    }

    /// Iterates over `(handle, &value)` pairs of live values.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        // Safety: arena size bounded by u32::MAX (enforced in append)
        self.data
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (Handle::new(i as u32), v)))
    }
}
