//! Cycle identifier shared by every record of one invocation.
//!
//! `cycle_id = xxhash64(entry_point + first_sequence + amount + market_data + routing_params + caller)`
//!
//! `first_sequence` is unique per committed invocation, so two cycles with
//! identical inputs still get distinct ids. No wall-clock input is hashed;
//! replaying a journal reproduces the same ids.

use crate::auth::CallerId;
use crate::error::EntryPoint;
use xxhash_rust::xxh64::xxh64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleIdInput<'a> {
    pub entry_point: EntryPoint,
    /// Sequence number the invocation's first record will carry.
    pub first_sequence: u64,
    pub amount: u128,
    pub market_data: &'a [u8],
    pub routing_params: &'a [u8],
    pub caller: Option<&'a CallerId>,
}

pub fn compute_cycle_id(input: &CycleIdInput<'_>) -> u64 {
    // Variable-length fields are length-prefixed so that moving bytes
    // between adjacent fields changes the digest.
    let mut buf = Vec::with_capacity(
        64 + input.market_data.len() + input.routing_params.len(),
    );

    buf.extend_from_slice(input.entry_point.as_str().as_bytes());
    buf.push(0xFF);
    buf.extend_from_slice(&input.first_sequence.to_le_bytes());
    buf.push(0xFF);
    buf.extend_from_slice(&input.amount.to_le_bytes());
    buf.push(0xFF);
    push_prefixed(&mut buf, input.market_data);
    push_prefixed(&mut buf, input.routing_params);
    match input.caller {
        Some(caller) => push_prefixed(&mut buf, caller.as_str().as_bytes()),
        None => buf.push(0x00),
    }

    xxh64(&buf, 0)
}

pub fn format_cycle_id(cycle_id: u64) -> String {
    format!("{cycle_id:016x}")
}

fn push_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    buf.extend_from_slice(bytes);
    buf.push(0xFF);
}
