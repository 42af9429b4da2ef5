//! Credential set: the durable secrets that let a session resume without a
//! fresh credential scan.
//!
//! The protocol client stores its secrets as a handful of named files
//! (`creds.json`, pre-keys, app-state sync keys). Vitrine treats each one as
//! an opaque blob keyed by file name.

use std::collections::BTreeMap;

/// Named collection of opaque credential blobs.
///
/// Ordered by name so mirroring and logging are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    files: BTreeMap<String, Vec<u8>>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.files.insert(name.into(), data);
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Overlay `other` on top of this set (newer blobs win).
    pub fn merge(&mut self, other: CredentialSet) {
        self.files.extend(other.files);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FromIterator<(String, Vec<u8>)> for CredentialSet {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for CredentialSet {
    type Item = (String, Vec<u8>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_existing_blobs() {
        let mut base: CredentialSet = [
            ("creds.json".to_string(), b"v1".to_vec()),
            ("pre-key-1.json".to_string(), b"k1".to_vec()),
        ]
        .into_iter()
        .collect();

        let mut update = CredentialSet::new();
        update.insert("creds.json", b"v2".to_vec());
        update.insert("pre-key-2.json", b"k2".to_vec());

        base.merge(update);

        assert_eq!(base.len(), 3);
        assert_eq!(base.get("creds.json"), Some(&b"v2"[..]));
        assert_eq!(
            base.names().collect::<Vec<_>>(),
            vec!["creds.json", "pre-key-1.json", "pre-key-2.json"]
        );
    }
}
