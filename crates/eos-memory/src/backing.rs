//! Persistent backing store for evicted and unallocated pages.
//!
//! One entry per allocated page, keyed `"<process>:<page>"`. The whole
//! map is rewritten to the backing file on every mutation and on
//! shutdown; the on-disk format is one `<key> <hex>` line per entry,
//! lowercase hex, entries in key order. File I/O is best-effort: a
//! missing file at load is fine and write failures are logged and
//! swallowed.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use log::warn;

/// Default backing-store file name.
pub const BACKING_STORE_FILE: &str = "csopesy-backing-store.txt";

/// Key → byte-buffer persistence for page contents.
#[derive(Debug, Default)]
pub struct BackingStore {
    path: Option<PathBuf>,
    entries: BTreeMap<String, Vec<u8>>,
}

/// Encode bytes as continuous lowercase hex.
fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Decode continuous hex into bytes, pairwise; a trailing odd digit and
/// non-hex pairs are ignored.
fn decode_hex(hex: &str) -> Vec<u8> {
    let chars: Vec<char> = hex.chars().collect();
    let mut out = Vec::with_capacity(chars.len() / 2);
    let mut i = 0;
    while i + 1 < chars.len() {
        let hi = chars[i].to_digit(16);
        let lo = chars[i + 1].to_digit(16);
        if let (Some(hi), Some(lo)) = (hi, lo) {
            out.push(((hi << 4) | lo) as u8);
        }
        i += 2;
    }
    out
}

impl BackingStore {
    /// Open a store persisted at `path`, loading any existing contents.
    ///
    /// A missing or unreadable file is not an error; the store starts
    /// empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut store = Self {
            path: Some(path),
            entries: BTreeMap::new(),
        };
        store.load();
        store
    }

    /// A store with no file behind it, for tests.
    pub fn in_memory() -> Self {
        Self::default()
    }

    fn load(&mut self) {
        let Some(path) = &self.path else { return };
        let Ok(text) = fs::read_to_string(path) else {
            return;
        };
        for line in text.lines() {
            let mut parts = line.split_whitespace();
            let (Some(key), Some(hex)) = (parts.next(), parts.next()) else {
                continue;
            };
            self.entries.insert(key.to_string(), decode_hex(hex));
        }
    }

    /// Rewrite the backing file from the current map. Best-effort.
    pub fn persist(&self) {
        let Some(path) = &self.path else { return };
        let mut text = String::new();
        for (key, bytes) in &self.entries {
            let _ = writeln!(text, "{} {}", key, encode_hex(bytes));
        }
        if let Err(e) = fs::write(path, text) {
            warn!("backing store write to {} failed: {}", path.display(), e);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Vec<u8>> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, bytes: Vec<u8>) {
        self.entries.insert(key, bytes);
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys currently present, in order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let bytes = vec![0x00, 0x12, 0xab, 0xff];
        let hex = encode_hex(&bytes);
        assert_eq!(hex, "0012abff");
        assert_eq!(decode_hex(&hex), bytes);
    }

    #[test]
    fn decode_ignores_trailing_odd_digit() {
        assert_eq!(decode_hex("0a1"), vec![0x0a]);
        assert_eq!(decode_hex(""), Vec::<u8>::new());
    }

    #[test]
    fn in_memory_store_round_trips_entries() {
        let mut store = BackingStore::in_memory();
        store.insert("p:0".to_string(), vec![1, 2, 3]);
        assert_eq!(store.get("p:0"), Some(&vec![1, 2, 3]));
        assert_eq!(store.len(), 1);
        store.remove("p:0");
        assert!(store.is_empty());
    }

    #[test]
    fn persist_and_reload_from_file() {
        let dir = std::env::temp_dir().join("eos-backing-test");
        let _ = fs::create_dir_all(&dir);
        let path = dir.join("csopesy-backing-store.txt");
        let _ = fs::remove_file(&path);

        let mut store = BackingStore::open(&path);
        store.insert("alpha:0".to_string(), vec![0x12, 0x34]);
        store.insert("alpha:1".to_string(), vec![0; 4]);
        store.persist();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "alpha:0 1234\nalpha:1 00000000\n");

        let reloaded = BackingStore::open(&path);
        assert_eq!(reloaded.get("alpha:0"), Some(&vec![0x12, 0x34]));
        assert_eq!(reloaded.len(), 2);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_loads_empty() {
        let store = BackingStore::open("/nonexistent/dir/backing.txt");
        assert!(store.is_empty());
    }
}
