//! Synthetic source addresses.
//!
//! Addresses are uniformly random over all four octets. Nothing is excluded
//! (reserved ranges, duplicates); they only need to vary between blocks of
//! requests.

use rand::Rng;

use crate::types::SyntheticAddress;

/// Produces a fresh [`SyntheticAddress`] on every call.
pub trait AddressSource: Send {
    fn next_address(&mut self) -> SyntheticAddress;
}

/// Stateless random address generator backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddressRotator;

impl AddressRotator {
    pub fn new() -> Self {
        Self
    }

    /// Generate a new address.
    pub fn generate(&self) -> SyntheticAddress {
        SyntheticAddress::new(rand::thread_rng().gen::<[u8; 4]>())
    }
}

impl AddressSource for AddressRotator {
    fn next_address(&mut self) -> SyntheticAddress {
        self.generate()
    }
}

impl<F> AddressSource for F
where
    F: FnMut() -> SyntheticAddress + Send,
{
    fn next_address(&mut self) -> SyntheticAddress {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_address_has_four_octets() {
        let addr = AddressRotator::new().generate();
        let text = addr.to_string();
        let parts: Vec<u8> = text.split('.').map(|p| p.parse().unwrap()).collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts, addr.octets().to_vec());
    }

    #[test]
    fn test_generated_addresses_vary() {
        let mut rotator = AddressRotator::new();
        let seen: HashSet<_> = (0..64).map(|_| rotator.next_address()).collect();
        // 64 draws over 2^32 values; a collision down to a handful is not
        // realistic.
        assert!(seen.len() > 32);
    }

    #[test]
    fn test_closure_address_source() {
        let mut n = 0u8;
        let mut source = move || {
            n += 1;
            SyntheticAddress::new([n, 0, 0, 0])
        };
        assert_eq!(source.next_address().to_string(), "1.0.0.0");
        assert_eq!(source.next_address().to_string(), "2.0.0.0");
    }
}
