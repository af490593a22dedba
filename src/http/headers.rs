//! Ordered header / parameter store.
//!
//! Entries are kept in insertion order and several entries may share a key.
//! Deleting an entry only tombstones it; its storage is reused after the
//! next [`Headers::reset`].

use crate::http::ascii::canonical_header_byte;

#[derive(Debug, Clone, Default)]
struct Entry {
    key: Vec<u8>,
    value: Vec<u8>,
    tombstoned: bool,
}

/// Order-preserving multi-map of byte keys to byte values.
///
/// A store created with [`Headers::normalized`] holds wire headers whose keys
/// were canonicalised while parsing; lookups canonicalise the queried key the
/// same way, which makes them case-insensitive. A store created with
/// [`Headers::new`] compares keys verbatim so outbound headers keep the
/// casing the application chose.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<Entry>,
    len: usize,
    normalize: bool,
}

impl Headers {
    /// Creates a store with exact key matching.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose lookups canonicalise the queried key.
    pub fn normalized() -> Self {
        Self {
            normalize: true,
            ..Self::default()
        }
    }

    pub fn is_normalized(&self) -> bool {
        self.normalize
    }

    /// Appends an entry after every existing one.
    pub fn append(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        let key = key.as_ref();
        let normalize = self.normalize;
        let entry = self.next_slot();
        if normalize {
            let mut prev = None;
            for &b in key {
                let c = canonical_header_byte(prev, b);
                entry.key.push(c);
                prev = Some(c);
            }
        } else {
            entry.key.extend_from_slice(key);
        }
        entry.value.extend_from_slice(value.as_ref());
    }

    /// Appends a key that is already in canonical form.
    pub(crate) fn append_raw(&mut self, key: &[u8], value: &[u8]) {
        let entry = self.next_slot();
        entry.key.extend_from_slice(key);
        entry.value.extend_from_slice(value);
    }

    fn next_slot(&mut self) -> &mut Entry {
        if self.len == self.entries.len() {
            self.entries.push(Entry::default());
        }
        let entry = &mut self.entries[self.len];
        self.len += 1;
        entry.key.clear();
        entry.value.clear();
        entry.tombstoned = false;
        entry
    }

    /// Removes every entry with `key`, then appends `key: value`.
    pub fn set(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        let key = key.as_ref();
        self.delete(key);
        self.append(key, value);
    }

    /// Value of the first live entry matching `key`.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&[u8]> {
        let key = key.as_ref();
        self.live()
            .find(|e| self.matches(&e.key, key))
            .map(|e| e.value.as_slice())
    }

    /// Like [`get`](Self::get) but only returns UTF-8 values.
    pub fn get_str(&self, key: impl AsRef<[u8]>) -> Option<&str> {
        self.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Values of every live entry matching `key`, in insertion order.
    pub fn get_all(&self, key: impl AsRef<[u8]>) -> Vec<&[u8]> {
        let key = key.as_ref();
        self.live()
            .filter(|e| self.matches(&e.key, key))
            .map(|e| e.value.as_slice())
            .collect()
    }

    pub fn contains(&self, key: impl AsRef<[u8]>) -> bool {
        self.get(key).is_some()
    }

    /// Tombstones every entry matching `key` and returns how many there were.
    pub fn delete(&mut self, key: impl AsRef<[u8]>) -> usize {
        let key = key.as_ref();
        let normalize = self.normalize;
        let mut removed = 0;
        for entry in &mut self.entries[..self.len] {
            if !entry.tombstoned && key_matches(&entry.key, key, normalize) {
                entry.tombstoned = true;
                removed += 1;
            }
        }
        removed
    }

    /// Case-insensitive lookup regardless of how the store was created.
    pub fn get_ignore_ascii_case(&self, key: impl AsRef<[u8]>) -> Option<&[u8]> {
        let key = key.as_ref();
        self.live()
            .find(|e| e.key.eq_ignore_ascii_case(key))
            .map(|e| e.value.as_slice())
    }

    /// Case-insensitive [`delete`](Self::delete).
    pub fn delete_ignore_ascii_case(&mut self, key: impl AsRef<[u8]>) -> usize {
        let key = key.as_ref();
        let mut removed = 0;
        for entry in &mut self.entries[..self.len] {
            if !entry.tombstoned && entry.key.eq_ignore_ascii_case(key) {
                entry.tombstoned = true;
                removed += 1;
            }
        }
        removed
    }

    /// Tombstones everything and truncates the store to empty. Entry storage
    /// is kept for the next round of appends.
    pub fn reset(&mut self) {
        for entry in &mut self.entries[..self.len] {
            entry.tombstoned = true;
        }
        self.len = 0;
    }

    /// Calls `visitor` for every live entry in order.
    pub fn each_live(&self, mut visitor: impl FnMut(&[u8], &[u8])) {
        for entry in self.live() {
            visitor(&entry.key, &entry.value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.live().map(|e| (e.key.as_slice(), e.value.as_slice()))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live().count()
    }

    pub fn is_empty(&self) -> bool {
        self.live().next().is_none()
    }

    /// Bytes currently reserved by keys and values, live or not.
    pub fn retained_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.key.capacity() + e.value.capacity())
            .sum()
    }

    /// Drops entry storage if it grew past `ceiling` bytes.
    pub(crate) fn shrink_to_ceiling(&mut self, ceiling: usize) {
        if self.retained_bytes() > ceiling {
            self.entries = Vec::new();
            self.len = 0;
        }
    }

    fn live(&self) -> impl Iterator<Item = &Entry> {
        self.entries[..self.len].iter().filter(|e| !e.tombstoned)
    }

    fn matches(&self, stored: &[u8], query: &[u8]) -> bool {
        key_matches(stored, query, self.normalize)
    }
}

fn key_matches(stored: &[u8], query: &[u8], normalize: bool) -> bool {
    if stored.len() != query.len() {
        return false;
    }
    if !normalize {
        return stored == query;
    }
    let mut prev = None;
    for (&s, &q) in stored.iter().zip(query) {
        let c = canonical_header_byte(prev, q);
        if s != c {
            return false;
        }
        prev = Some(c);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_reuses_entry_storage() {
        let mut headers = Headers::new();
        headers.append("X-Long-Header-Name", "a value that needs some room");
        let before = headers.retained_bytes();

        headers.reset();
        assert!(headers.is_empty());
        assert_eq!(headers.retained_bytes(), before);

        headers.append("X", "y");
        assert_eq!(headers.entries.len(), 1);
        assert_eq!(headers.get("X"), Some(&b"y"[..]));
    }

    #[test]
    fn delete_keeps_slot_until_reset() {
        let mut headers = Headers::new();
        headers.append("A", "1");
        headers.append("B", "2");
        assert_eq!(headers.delete("A"), 1);
        assert_eq!(headers.len, 2);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("A"), None);
    }

    #[test]
    fn shrink_drops_oversized_storage() {
        let mut headers = Headers::new();
        headers.append("Big", vec![b'x'; 1024]);
        headers.reset();
        headers.shrink_to_ceiling(64);
        assert_eq!(headers.retained_bytes(), 0);
    }
}
