//! Calldata encoding
//!
//! A call is the 4-byte selector (keccak-256 of the canonical signature)
//! followed by head/tail encoded arguments. Static arguments occupy one head
//! word each; dynamic arguments put a byte offset in the head and append
//! their length-prefixed content to the tail. Offsets are relative to the
//! start of the argument area.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};

/// One call argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// `uint256`
    Uint(U256),
    /// `address`
    Addr(Address),
    /// `bytes32`
    Word(B256),
    /// `string`
    Str(String),
    /// `bytes`
    Bytes(Vec<u8>),
    /// `uint256[]`
    UintArray(Vec<U256>),
}

/// First four bytes of the keccak-256 hash of a canonical signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Encode the argument area (no selector)
pub fn encode_args(args: &[Arg]) -> Vec<u8> {
    let head_len = args.len() * 32;
    let mut head = Vec::with_capacity(head_len);
    let mut tail: Vec<u8> = Vec::new();

    for arg in args {
        match arg {
            Arg::Uint(value) => head.extend_from_slice(&value.to_be_bytes::<32>()),
            Arg::Addr(value) => {
                head.extend_from_slice(&[0u8; 12]);
                head.extend_from_slice(value.as_slice());
            }
            Arg::Word(value) => head.extend_from_slice(value.as_slice()),
            Arg::Str(value) => {
                push_offset(&mut head, head_len, tail.len());
                append_len_prefixed(&mut tail, value.as_bytes());
            }
            Arg::Bytes(value) => {
                push_offset(&mut head, head_len, tail.len());
                append_len_prefixed(&mut tail, value);
            }
            Arg::UintArray(values) => {
                push_offset(&mut head, head_len, tail.len());
                tail.extend_from_slice(&U256::from(values.len()).to_be_bytes::<32>());
                for value in values {
                    tail.extend_from_slice(&value.to_be_bytes::<32>());
                }
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// Encode a full call: selector plus argument area
pub fn encode_call(signature: &str, args: &[Arg]) -> Bytes {
    let mut data = Vec::with_capacity(4 + args.len() * 32);
    data.extend_from_slice(&selector(signature));
    data.extend_from_slice(&encode_args(args));
    Bytes::from(data)
}

fn push_offset(head: &mut Vec<u8>, head_len: usize, tail_len: usize) {
    let offset = U256::from(head_len + tail_len);
    head.extend_from_slice(&offset.to_be_bytes::<32>());
}

fn append_len_prefixed(tail: &mut Vec<u8>, data: &[u8]) {
    tail.extend_from_slice(&U256::from(data.len()).to_be_bytes::<32>());
    tail.extend_from_slice(data);
    let rem = data.len() % 32;
    if rem != 0 {
        tail.extend_from_slice(&[0u8; 32][..32 - rem]);
    }
}
