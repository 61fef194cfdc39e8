// Wire constants, spec §6.

use alloy_primitives::{address, b256, Address, B256};

pub const TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

pub const ZERO_ADDRESS: Address = Address::ZERO;

pub const DEAD_ADDRESS: Address = address!("000000000000000000000000000000000000dead");

/// Addresses excluded from ranked-holder lists before truncation to `top_n`
/// (spec §4.3: "filtered of ignore-list addresses").
pub const IGNORE_LIST: &[Address] = &[ZERO_ADDRESS, DEAD_ADDRESS];

pub fn is_ignored(addr: &Address) -> bool {
    IGNORE_LIST.contains(addr)
}
