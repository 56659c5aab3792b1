//! Persistent containers used by the route search.
//!
//! Every "mutating" method takes `&self` and hands back a new value; the
//! receiver is left untouched. Storage sits behind an `Arc` and is only
//! copied when a write happens, so a search branch can be abandoned by
//! simply dropping its snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Immutable ordered set.
#[derive(Clone, PartialEq, Eq)]
pub struct ImmutableSet<T: Ord> {
    items: Arc<BTreeSet<T>>,
}

impl<T: Ord + Clone> ImmutableSet<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(BTreeSet::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, value: &T) -> bool {
        self.items.contains(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }

    pub fn insert(&self, value: T) -> Self {
        if self.contains(&value) {
            return self.clone();
        }
        let mut result = self.clone();
        Arc::make_mut(&mut result.items).insert(value);
        result
    }

    pub fn remove(&self, value: &T) -> Self {
        if !self.contains(value) {
            return self.clone();
        }
        let mut result = self.clone();
        Arc::make_mut(&mut result.items).remove(value);
        result
    }

    /// Adds every value yielded by `values`, copying the backing store at
    /// most once.
    pub fn union<I: IntoIterator<Item = T>>(&self, values: I) -> Self {
        let mut values = values.into_iter().filter(|v| !self.contains(v)).peekable();
        if values.peek().is_none() {
            return self.clone();
        }
        let mut result = self.clone();
        Arc::make_mut(&mut result.items).extend(values);
        result
    }
}

impl<T: Ord + Clone> Default for ImmutableSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Clone> FromIterator<T> for ImmutableSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: Arc::new(iter.into_iter().collect()),
        }
    }
}

impl<T: Ord + fmt::Debug> fmt::Debug for ImmutableSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.items.iter()).finish()
    }
}

/// Immutable multiset: tracks how many copies of each value are held.
#[derive(Clone, PartialEq, Eq)]
pub struct MultiSet<T: Ord> {
    counts: Arc<BTreeMap<T, usize>>,
    total: usize,
}

impl<T: Ord + Clone> MultiSet<T> {
    pub fn new() -> Self {
        Self {
            counts: Arc::new(BTreeMap::new()),
            total: 0,
        }
    }

    /// Total number of copies across all values.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn count(&self, value: &T) -> usize {
        self.counts.get(value).copied().unwrap_or(0)
    }

    /// Distinct values with their counts, in order.
    pub fn iter(&self) -> impl Iterator<Item = (&T, usize)> + '_ {
        self.counts.iter().map(|(value, &count)| (value, count))
    }

    pub fn add(&self, value: T) -> Self {
        self.add_many(std::iter::once(value))
    }

    pub fn add_many<I: IntoIterator<Item = T>>(&self, values: I) -> Self {
        let mut values = values.into_iter().peekable();
        if values.peek().is_none() {
            return self.clone();
        }
        let mut result = self.clone();
        let counts = Arc::make_mut(&mut result.counts);
        for value in values {
            *counts.entry(value).or_insert(0) += 1;
            result.total += 1;
        }
        result
    }

    /// Removes one copy of every value yielded by `values`. Values that are
    /// not held are ignored.
    pub fn remove_many<'a, I>(&self, values: I) -> Self
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mut result = self.clone();
        for value in values {
            if result.count(value) == 0 {
                continue;
            }
            let counts = Arc::make_mut(&mut result.counts);
            if let Some(count) = counts.get_mut(value) {
                *count -= 1;
                if *count == 0 {
                    counts.remove(value);
                }
                result.total -= 1;
            }
        }
        result
    }
}

impl<T: Ord + Clone> Default for MultiSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Clone> FromIterator<T> for MultiSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new().add_many(iter)
    }
}

impl<T: Ord + fmt::Debug> fmt::Debug for MultiSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.counts.iter()).finish()
    }
}

/// Immutable map where each key holds exactly one value and a value may be
/// held by many keys. Keeps a reverse index so "which keys hold this value"
/// is a lookup rather than a scan.
#[derive(Clone, PartialEq, Eq)]
pub struct OneToManyMap<K: Ord, V: Ord> {
    forward: Arc<BTreeMap<K, V>>,
    reverse: Arc<BTreeMap<V, ImmutableSet<K>>>,
}

impl<K: Ord + Clone, V: Ord + Clone> OneToManyMap<K, V> {
    pub fn new() -> Self {
        Self {
            forward: Arc::new(BTreeMap::new()),
            reverse: Arc::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.forward.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.forward.contains_key(key)
    }

    /// Every key currently mapped to `value`.
    pub fn keys_containing(&self, value: &V) -> ImmutableSet<K> {
        self.reverse.get(value).cloned().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.forward.iter()
    }

    /// Maps `key` to `value`, replacing any previous value for `key`.
    pub fn insert(&self, key: K, value: V) -> Self {
        let mut result = self.clone();
        let previous = Arc::make_mut(&mut result.forward).insert(key.clone(), value.clone());
        let reverse = Arc::make_mut(&mut result.reverse);
        if let Some(previous) = previous {
            if let Some(holders) = reverse.get(&previous) {
                let holders = holders.remove(&key);
                if holders.is_empty() {
                    reverse.remove(&previous);
                } else {
                    reverse.insert(previous, holders);
                }
            }
        }
        let holders = reverse.get(&value).cloned().unwrap_or_default().insert(key);
        reverse.insert(value, holders);
        result
    }
}

impl<K: Ord + Clone, V: Ord + Clone> Default for OneToManyMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug, V: Ord + fmt::Debug> fmt::Debug for OneToManyMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.forward.iter()).finish()
    }
}

/// Immutable append-only list. Pushing shares the existing entries.
pub struct ImmutableList<T> {
    head: Option<Arc<Cons<T>>>,
    len: usize,
}

struct Cons<T> {
    value: T,
    prev: Option<Arc<Cons<T>>>,
}

impl<T> ImmutableList<T> {
    pub fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&self, value: T) -> Self {
        Self {
            head: Some(Arc::new(Cons {
                value,
                prev: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// Entries in insertion order.
    pub fn to_vec(&self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head.as_deref();
        while let Some(cons) = cursor {
            out.push(&cons.value);
            cursor = cons.prev.as_deref();
        }
        out.reverse();
        out
    }
}

impl<T> Clone for ImmutableList<T> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<T> Default for ImmutableList<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Unlink iteratively; long logs would otherwise recurse once per entry.
impl<T> Drop for ImmutableList<T> {
    fn drop(&mut self) {
        let mut next = self.head.take();
        while let Some(cons) = next {
            match Arc::try_unwrap(cons) {
                Ok(mut cons) => next = cons.prev.take(),
                Err(_) => break,
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ImmutableList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_insert_leaves_original_untouched() {
        let a: ImmutableSet<u32> = [1, 2].into_iter().collect();
        let b = a.insert(3);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 3);
        assert!(!a.contains(&3));
        assert!(b.contains(&3));
        assert_eq!(b.remove(&1).iter().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn set_union_skips_existing() {
        let a: ImmutableSet<u32> = [1, 2].into_iter().collect();
        let b = a.union([2, 3, 4]);
        assert_eq!(b.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(a.union([1, 2]), a);
    }

    #[test]
    fn multiset_counts_copies() {
        let keys = MultiSet::new().add("red").add("red").add("blue");
        assert_eq!(keys.count(&"red"), 2);
        assert_eq!(keys.count(&"blue"), 1);
        assert_eq!(keys.count(&"green"), 0);
        assert_eq!(keys.len(), 3);

        let spent = keys.remove_many([&"red", &"green"]);
        assert_eq!(spent.count(&"red"), 1);
        assert_eq!(spent.len(), 2);
        assert_eq!(keys.count(&"red"), 2);
    }

    #[test]
    fn multiset_drops_exhausted_values() {
        let keys = MultiSet::new().add(7).remove_many([&7]);
        assert!(keys.is_empty());
        assert_eq!(keys.iter().count(), 0);
    }

    #[test]
    fn one_to_many_reverse_lookup() {
        let map = OneToManyMap::new()
            .insert("drawer", "small key")
            .insert("desk", "small key")
            .insert("statue", "medal");
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&"desk"), Some(&"small key"));
        let holders = map.keys_containing(&"small key");
        assert_eq!(holders.iter().copied().collect::<Vec<_>>(), vec!["desk", "drawer"]);
        assert!(map.keys_containing(&"crank").is_empty());
    }

    #[test]
    fn one_to_many_replace_updates_reverse_index() {
        let before = OneToManyMap::new().insert("desk", "small key");
        let after = before.insert("desk", "medal");
        assert!(after.keys_containing(&"small key").is_empty());
        assert!(after.keys_containing(&"medal").contains(&"desk"));
        assert!(before.keys_containing(&"small key").contains(&"desk"));
    }

    #[test]
    fn list_shares_prefix() {
        let base = ImmutableList::new().push("a").push("b");
        let left = base.push("c");
        let right = base.push("d");
        assert_eq!(left.to_vec(), vec![&"a", &"b", &"c"]);
        assert_eq!(right.to_vec(), vec![&"a", &"b", &"d"]);
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn long_list_drops_without_overflow() {
        let mut list = ImmutableList::new();
        for i in 0..200_000 {
            list = list.push(i);
        }
        assert_eq!(list.len(), 200_000);
        drop(list);
    }
}
