//! Return-data decoding
//!
//! [`Decoder`] is a bounds-checked cursor over 32-byte words. Call sites
//! walk it through exactly the schema they declared; offsets into dynamic
//! regions produce sub-decoders whose relative offsets resolve against the
//! region start, matching the standard encoding of nested arrays and
//! dynamic tuples. Every violation carries the method name so a bad read is
//! attributable from the log line alone.

use alloy_primitives::{Address, B256, U256};

use photomint_core::error::StructParseError;

/// Decode result, always a [`StructParseError`] on failure
pub type DecodeResult<T> = std::result::Result<T, StructParseError>;

/// Selector of the standard `Error(string)` revert payload
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Bounds-checked word cursor over one return-data region
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    method: &'static str,
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Decoder over the full return data of `method`
    pub fn new(method: &'static str, data: &'a [u8]) -> Self {
        Self { method, data }
    }

    fn err(&self, detail: impl Into<String>) -> StructParseError {
        StructParseError::new(self.method, detail)
    }

    /// The 32-byte word at `index`
    pub fn word(&self, index: usize) -> DecodeResult<&'a [u8]> {
        let start = index * 32;
        self.data
            .get(start..start + 32)
            .ok_or_else(|| self.err(format!("missing word {index}")))
    }

    /// `uint256` at word `index`
    pub fn uint(&self, index: usize) -> DecodeResult<U256> {
        Ok(U256::from_be_slice(self.word(index)?))
    }

    /// `uint256` at word `index`, required to fit `u64`
    pub fn uint_u64(&self, index: usize) -> DecodeResult<u64> {
        let value = self.uint(index)?;
        u64::try_from(value).map_err(|_| self.err(format!("word {index} out of u64 range")))
    }

    fn uint_usize(&self, index: usize) -> DecodeResult<usize> {
        let value = self.uint(index)?;
        usize::try_from(value).map_err(|_| self.err(format!("word {index} out of range")))
    }

    /// `address` at word `index`; the upper 12 bytes must be zero
    pub fn address(&self, index: usize) -> DecodeResult<Address> {
        let word = self.word(index)?;
        if word[..12].iter().any(|b| *b != 0) {
            return Err(self.err(format!("word {index} is not an address")));
        }
        Ok(Address::from_slice(&word[12..]))
    }

    /// `bytes32` at word `index`
    pub fn fixed_word(&self, index: usize) -> DecodeResult<B256> {
        Ok(B256::from_slice(self.word(index)?))
    }

    /// Sub-decoder starting at byte `offset` of this region
    pub fn subview(&self, offset: usize) -> DecodeResult<Decoder<'a>> {
        let data = self
            .data
            .get(offset..)
            .ok_or_else(|| self.err(format!("offset {offset} out of bounds")))?;
        Ok(Decoder {
            method: self.method,
            data,
        })
    }

    /// Follow the offset in head slot `index` to its dynamic region
    pub fn tail(&self, index: usize) -> DecodeResult<Decoder<'a>> {
        let offset = self.uint_usize(index)?;
        self.subview(offset)
    }

    /// Length word of an array this decoder is positioned at
    pub fn array_len(&self) -> DecodeResult<usize> {
        let len = self.uint_usize(0)?;
        // Each element consumes at least one word after the length.
        if len > self.data.len() / 32 {
            return Err(self.err(format!("implausible array length {len}")));
        }
        Ok(len)
    }

    /// Element `index` of an array of static tuples spanning `stride_words`
    pub fn static_item(&self, index: usize, stride_words: usize) -> DecodeResult<Decoder<'a>> {
        let start = 32 + index * stride_words * 32;
        let data = self
            .data
            .get(start..start + stride_words * 32)
            .ok_or_else(|| self.err(format!("truncated array element {index}")))?;
        Ok(Decoder {
            method: self.method,
            data,
        })
    }

    /// Element `index` of an array of dynamic elements; offsets are relative
    /// to the start of the element area (right after the length word)
    pub fn dyn_item(&self, index: usize) -> DecodeResult<Decoder<'a>> {
        let relative = self.uint_usize(1 + index)?;
        let start = 32usize
            .checked_add(relative)
            .ok_or_else(|| self.err(format!("element {index} offset overflow")))?;
        self.subview(start)
    }

    /// `string` behind the offset in head slot `index`
    pub fn string_tail(&self, index: usize) -> DecodeResult<String> {
        let bytes = self.bytes_tail(index)?;
        String::from_utf8(bytes).map_err(|_| self.err(format!("word {index} is not a utf-8 string")))
    }

    /// `bytes` behind the offset in head slot `index`
    pub fn bytes_tail(&self, index: usize) -> DecodeResult<Vec<u8>> {
        self.tail(index)?.len_prefixed_bytes()
    }

    /// Length-prefixed bytes this decoder is positioned at
    pub fn len_prefixed_bytes(&self) -> DecodeResult<Vec<u8>> {
        let len = self.uint_usize(0)?;
        let end = 32usize
            .checked_add(len)
            .ok_or_else(|| self.err(format!("bytes length {len} overflows")))?;
        let bytes = self
            .data
            .get(32..end)
            .ok_or_else(|| self.err(format!("truncated bytes of length {len}")))?;
        Ok(bytes.to_vec())
    }

    /// `uint256[]` this decoder is positioned at
    pub fn uint_array(&self) -> DecodeResult<Vec<U256>> {
        let len = self.array_len()?;
        (0..len).map(|i| self.uint(1 + i)).collect()
    }
}

/// Extract the reason from a standard `Error(string)` revert payload
pub fn revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 || data[..4] != ERROR_SELECTOR {
        return None;
    }
    Decoder::new("Error(string)", &data[4..]).string_tail(0).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode_args, Arg};
    use assert_matches::assert_matches;

    #[test]
    fn missing_field_yields_struct_parse_error() {
        // Two head words where a caller expects three.
        let data = encode_args(&[
            Arg::Uint(U256::from(7u64)),
            Arg::Addr(Address::repeat_byte(0xaa)),
        ]);
        let decoder = Decoder::new("getSelfCollections", &data);
        assert_eq!(decoder.uint(0).unwrap(), U256::from(7u64));
        let err = decoder.word(2).unwrap_err();
        assert_eq!(err.method, "getSelfCollections");
        assert!(err.detail.contains("missing word 2"));
    }

    #[test]
    fn dirty_address_word_is_rejected() {
        let mut data = vec![0u8; 32];
        data[0] = 0x01;
        data[31] = 0xff;
        assert_matches!(Decoder::new("balanceOf", &data).address(0), Err(_));
        assert!(Decoder::new("balanceOf", &data).uint(0).is_ok());
    }

    #[test]
    fn out_of_bounds_offset_is_rejected() {
        // Head claims the string lives at byte 0x200 of a 64-byte payload.
        let mut data = vec![0u8; 64];
        data[30] = 0x02;
        let err = Decoder::new("tokenMeta", &data).string_tail(0).unwrap_err();
        assert!(err.detail.contains("out of bounds"));
    }

    #[test]
    fn dynamic_tuple_array_decodes_by_schema() {
        // One-element (uint256, string, bytes)[] assembled by hand: length
        // word, one element offset, then the tuple region.
        let tuple = encode_args(&[
            Arg::Uint(U256::from(3u64)),
            Arg::Str("meta://3".into()),
            Arg::Bytes(vec![0xde, 0xad]),
        ]);
        let mut data = Vec::new();
        data.extend_from_slice(&U256::from(1u64).to_be_bytes::<32>());
        data.extend_from_slice(&U256::from(32u64).to_be_bytes::<32>());
        data.extend_from_slice(&tuple);

        let array = Decoder::new("getSelfTokens", &data);
        assert_eq!(array.array_len().unwrap(), 1);
        let item = array.dyn_item(0).unwrap();
        assert_eq!(item.uint(0).unwrap(), U256::from(3u64));
        assert_eq!(item.string_tail(1).unwrap(), "meta://3");
        assert_eq!(item.bytes_tail(2).unwrap(), vec![0xde, 0xad]);
    }

    #[test]
    fn uint_array_round_trip() {
        let data = encode_args(&[Arg::UintArray(vec![U256::from(4u64), U256::from(9u64)])]);
        let values = Decoder::new("counts", &data).tail(0).unwrap().uint_array().unwrap();
        assert_eq!(values, vec![U256::from(4u64), U256::from(9u64)]);
    }

    #[test]
    fn implausible_array_length_is_rejected() {
        let mut data = vec![0u8; 32];
        data[0] = 0xff; // enormous length claim
        let err = Decoder::new("getSelfPublicTokens", &data).array_len().unwrap_err();
        assert!(err.detail.contains("implausible"));
    }

    #[test]
    fn revert_reason_decodes_error_string() {
        let mut data = Vec::from(&[0x08u8, 0xc3, 0x79, 0xa0][..]);
        data.extend_from_slice(&encode_args(&[Arg::Str("No access".into())]));
        assert_eq!(revert_reason(&data).as_deref(), Some("No access"));
        assert_eq!(revert_reason(&[0x01, 0x02]), None);
    }

    #[test]
    fn oversize_uint_does_not_fit_u64() {
        let data = encode_args(&[Arg::Uint(U256::MAX)]);
        assert_matches!(Decoder::new("totalTokens", &data).uint_u64(0), Err(_));
    }
}
