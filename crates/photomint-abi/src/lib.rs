//! Photomint ABI - Typed Contract Call Codec
//!
//! Encoding builds calldata from a closed argument set (uint256, address,
//! bytes32, string, bytes, uint256[]) with the standard head/tail layout.
//! Decoding is schema-first: each call site drives a bounds-checked word
//! cursor through exactly the shape it declared, and every structural
//! violation surfaces as a [`StructParseError`] naming the method. There is
//! no runtime type dispatch and no partial decode.

#![forbid(unsafe_code)]

/// Selector derivation and head/tail argument encoding
pub mod encode;

/// Bounds-checked word cursor over return data
pub mod decode;

pub use decode::{revert_reason, Decoder};
pub use encode::{encode_args, encode_call, selector, Arg};

pub use photomint_core::error::StructParseError;
