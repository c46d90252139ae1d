//! Blacklist owner
//!
//! Danh sách tĩnh các địa chỉ owner đã biết là scam. Owner nằm trong danh sách
//! thì điểm luôn bằng 0.

use std::collections::HashSet;

/// Static owner blacklist, compared case-insensitively
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    addresses: HashSet<String>,
}

impl Blacklist {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            addresses: addresses
                .into_iter()
                .map(|a| normalize(a.as_ref()))
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.contains(&normalize(address))
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

fn normalize(address: &str) -> String {
    address.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blacklist_matching() {
        let blacklist = Blacklist::new(vec![" EQScam ", ""]);
        assert_eq!(blacklist.len(), 1);
        assert!(blacklist.contains("eqscam"));
        assert!(!blacklist.contains("EQhonest"));
    }
}
