//! Endpoint addresses and the deduplicated set published each cycle.

use std::collections::BTreeSet;
use std::fmt;

/// A single endpoint address in `ip:port` form.
///
/// No structure is imposed beyond the string form; two addresses are equal
/// iff their strings are equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(String);

impl Address {
    /// Formats an address from an endpoint IP and a port number.
    #[must_use]
    pub fn new(ip: &str, port: i32) -> Self {
        Self(format!("{ip}:{port}"))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Address {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

impl From<&str> for Address {
    fn from(addr: &str) -> Self {
        Self(addr.to_string())
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

/// The unique, order-independent collection of addresses resolved in one cycle.
///
/// Backed by an ordered set, so construction drops duplicates and equality
/// compares membership regardless of the order addresses were collected in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressSet(BTreeSet<Address>);

impl AddressSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no addresses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `addr` is a member.
    #[must_use]
    pub fn contains(&self, addr: &Address) -> bool {
        self.0.contains(addr)
    }

    /// Iterates the addresses in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.0.iter()
    }

    /// Returns the addresses as sorted strings.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl FromIterator<Address> for AddressSet {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for AddressSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(Address::from).collect()
    }
}

impl FromIterator<String> for AddressSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        iter.into_iter().map(Address::from).collect()
    }
}

impl<'a> IntoIterator for &'a AddressSet {
    type Item = &'a Address;
    type IntoIter = std::collections::btree_set::Iter<'a, Address>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Extend<Address> for AddressSet {
    fn extend<I: IntoIterator<Item = Address>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_formats_ip_and_port() {
        assert_eq!(Address::new("10.0.0.1", 8080).as_str(), "10.0.0.1:8080");
    }

    #[test]
    fn duplicates_collapse() {
        let set: AddressSet = ["10.0.0.1:80", "10.0.0.2:80", "10.0.0.1:80", "10.0.0.1:80"]
            .into_iter()
            .collect();

        assert_eq!(set.len(), 2);
        assert!(set.contains(&"10.0.0.1:80".into()));
        assert!(set.contains(&"10.0.0.2:80".into()));
    }

    #[test]
    fn equality_ignores_order() {
        let a: AddressSet = ["ab", "bb", "cc"].into_iter().collect();
        let b: AddressSet = ["bb", "cc", "ab"].into_iter().collect();

        assert_eq!(a, b);
    }

    #[test]
    fn equality_detects_different_members() {
        let a: AddressSet = ["ab", "bb", "cc"].into_iter().collect();
        let b: AddressSet = ["bb", "ab", ""].into_iter().collect();

        assert_ne!(a, b);
    }

    #[test]
    fn equality_detects_different_sizes() {
        let a: AddressSet = ["ab", "bb", "cc"].into_iter().collect();
        let b: AddressSet = ["bb", "ab"].into_iter().collect();

        assert_ne!(a, b);
    }

    #[test]
    fn duplicated_permutation_equals_original() {
        let a: AddressSet = ["10.0.0.1:80", "10.0.0.2:80"].into_iter().collect();
        let b: AddressSet = ["10.0.0.2:80", "10.0.0.1:80", "10.0.0.2:80"]
            .into_iter()
            .collect();

        assert_eq!(a, b);
    }

    #[test]
    fn to_strings_is_sorted() {
        let set: AddressSet = ["10.0.0.3:80", "10.0.0.1:80", "10.0.0.2:80"]
            .into_iter()
            .collect();

        assert_eq!(
            set.to_strings(),
            vec!["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]
        );
    }

    #[test]
    fn extend_keeps_members_unique() {
        let mut set: AddressSet = ["10.0.0.1:80"].into_iter().collect();
        set.extend([Address::from("10.0.0.1:80"), Address::from("10.0.0.2:80")]);

        assert_eq!(set.len(), 2);
    }
}
