//! Port assignment for local model servers.
//!
//! Ports are only checked against the supervisor's own bookkeeping, not
//! against the OS. The base port is reused whenever it is free; otherwise the
//! next port after the highest one in use is returned. Gaps left by stopped
//! servers below the maximum are never reclaimed.

use std::collections::BTreeSet;

/// Pick the port for a newly launched server.
///
/// Returns `None` only when the base port is taken and the highest allocated
/// port is already `u16::MAX`.
pub fn next_port(base: u16, allocated: &BTreeSet<u16>) -> Option<u16> {
    if !allocated.contains(&base) {
        return Some(base);
    }
    // base is in the set, so max exists
    allocated.last().and_then(|max| max.checked_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ports: &[u16]) -> BTreeSet<u16> {
        ports.iter().copied().collect()
    }

    #[test]
    fn test_empty_returns_base() {
        assert_eq!(next_port(8980, &set(&[])), Some(8980));
    }

    #[test]
    fn test_base_taken_returns_after_max() {
        assert_eq!(next_port(8980, &set(&[8980])), Some(8981));
        assert_eq!(next_port(8980, &set(&[8980, 8981])), Some(8982));
    }

    #[test]
    fn test_base_free_is_reused() {
        // m1 stopped, m2 still on 8981
        assert_eq!(next_port(8980, &set(&[8981])), Some(8980));
    }

    #[test]
    fn test_gaps_are_not_reclaimed() {
        // 8981 was freed but allocation continues past the maximum.
        assert_eq!(next_port(8980, &set(&[8980, 8982])), Some(8983));
    }

    #[test]
    fn test_unrelated_ports_below_base() {
        assert_eq!(next_port(8980, &set(&[8000, 8980])), Some(8981));
    }

    #[test]
    fn test_exhausted() {
        assert_eq!(next_port(8980, &set(&[8980, u16::MAX])), None);
    }

    #[test]
    fn test_deterministic_and_unique() {
        let mut allocated = BTreeSet::new();
        for _ in 0..50 {
            let port = next_port(8980, &allocated).unwrap();
            assert!(allocated.insert(port), "port {port} handed out twice");
        }
        assert_eq!(allocated.first(), Some(&8980));
        assert_eq!(allocated.last(), Some(&9029));
    }
}
