//! Small engine-internal containers.

use smallvec::SmallVec;

/// A fixed-capacity sequence kept sorted by key on insertion.
///
/// Insertions bisect on the key; once `N` entries are held, an insertion beyond the
/// current worst entry is dropped, so memory stays flat no matter how many candidates
/// are offered. Ascending key order; wrap keys in [`std::cmp::Reverse`] for
/// worst-first selections.
pub struct BoundedList<K: Ord + Copy, V, const N: usize> {
    entries: SmallVec<[(K, V); N]>,
}

impl<K: Ord + Copy, V, const N: usize> Default for BoundedList<K, V, N> {
    fn default() -> Self {
        Self {
            entries: SmallVec::new(),
        }
    }
}

impl<K: Ord + Copy, V, const N: usize> BoundedList<K, V, N> {
    /// Constructs an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers an entry; keeps the `N` smallest keys seen so far.
    pub fn insert(&mut self, key: K, value: V) {
        let at = self.entries.partition_point(|(k, _)| *k <= key);
        if at >= N {
            return;
        }
        if self.entries.len() == N {
            self.entries.pop();
        }
        self.entries.insert(at, (key, value));
    }

    /// Number of held entries, at most `N`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = &(K, V)> {
        self.entries.iter()
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K: Ord + Copy, V, const N: usize> IntoIterator for BoundedList<K, V, N> {
    type Item = (K, V);
    type IntoIter = smallvec::IntoIter<[(K, V); N]>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
