//! Control port allocation
//!
//! Ports are handed out upward from a base, skipping those held by live
//! tests. The caller must hold the registry lock across allocation and
//! insertion of the new record.

use std::collections::HashSet;

use crate::error::{K6Error, K6Result};

/// Return the first port in `base..base + search_limit` not in `held`
pub fn allocate_port(held: &HashSet<u16>, base: u16, search_limit: u16) -> K6Result<u16> {
    (0..search_limit)
        .map_while(|offset| base.checked_add(offset))
        .find(|port| !held.contains(port))
        .ok_or(K6Error::ResourceExhausted {
            base,
            limit: search_limit,
        })
}
