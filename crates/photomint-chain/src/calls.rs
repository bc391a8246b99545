//! Builders for the unsigned transaction requests behind each operation.
//!
//! Each builder encodes one contract write against the profile's deployed
//! addresses and returns a zero-value [`TxRequest`] for the signer to
//! price, sign and broadcast. Payload documents are serialized here so a
//! malformed payload is rejected before anything reaches the bridge.

use photomint_abi::{encode_call, Arg};
use photomint_core::{
    Address, Bytes, ChainProfile, CollectionPayload, EngineError, Result, TokenPayload, TxRequest,
    B256, U256,
};

const SIG_MINT: &str = "mint(uint256,uint256,string,bytes)";
const SIG_MINT_WITHOUT_ID: &str = "mintWithoutId(uint256,string,bytes)";
const SIG_COLLECTION_MINT: &str = "mintWithoutId(address,string,bytes)";
const SIG_APPROVE: &str = "approve(address,uint256)";
const SIG_PURCHASE: &str = "purchasePrivateCollection(bytes32,string,string,string,string,bytes)";

fn token_data(payload: &TokenPayload) -> Result<Vec<u8>> {
    payload
        .to_json()
        .map_err(|e| EngineError::config(format!("token payload serialization: {e}")))
}

/// Mint into a public collection via the router.
///
/// With an explicit `token_id` the id is fixed up front; without one the
/// router assigns the next id itself.
pub fn public_mint(
    profile: &ChainProfile,
    version: u64,
    token_id: Option<U256>,
    meta_uri: &str,
    payload: &TokenPayload,
) -> Result<TxRequest> {
    let data = token_data(payload)?;
    let encoded = match token_id {
        Some(id) => encode_call(
            SIG_MINT,
            &[
                Arg::Uint(U256::from(version)),
                Arg::Uint(id),
                Arg::Str(meta_uri.to_string()),
                Arg::Bytes(data),
            ],
        ),
        None => encode_call(
            SIG_MINT_WITHOUT_ID,
            &[
                Arg::Uint(U256::from(version)),
                Arg::Str(meta_uri.to_string()),
                Arg::Bytes(data),
            ],
        ),
    };
    Ok(TxRequest::call(profile.router, Bytes::from(encoded)))
}

/// Mint into a private collection clone owned by `owner`.
pub fn private_mint(
    collection: Address,
    owner: Address,
    meta_uri: &str,
    payload: &TokenPayload,
) -> Result<TxRequest> {
    let data = token_data(payload)?;
    let encoded = encode_call(
        SIG_COLLECTION_MINT,
        &[
            Arg::Addr(owner),
            Arg::Str(meta_uri.to_string()),
            Arg::Bytes(data),
        ],
    );
    Ok(TxRequest::call(collection, Bytes::from(encoded)))
}

/// Approve the collection factory to spend `amount` utility tokens.
pub fn approve(profile: &ChainProfile, amount: U256) -> TxRequest {
    let encoded = encode_call(
        SIG_APPROVE,
        &[Arg::Addr(profile.access_token), Arg::Uint(amount)],
    );
    TxRequest::call(profile.utility_token, Bytes::from(encoded))
}

/// Deploy a private collection clone at the address derived from `salt`.
pub fn purchase_collection(
    profile: &ChainProfile,
    salt: B256,
    name: &str,
    symbol: &str,
    collection_meta: &str,
    access_token_meta: &str,
    payload: &CollectionPayload,
) -> Result<TxRequest> {
    let data = payload
        .to_json()
        .map_err(|e| EngineError::config(format!("collection payload serialization: {e}")))?;
    let encoded = encode_call(
        SIG_PURCHASE,
        &[
            Arg::Word(salt),
            Arg::Str(name.to_string()),
            Arg::Str(collection_meta.to_string()),
            Arg::Str(access_token_meta.to_string()),
            Arg::Str(symbol.to_string()),
            Arg::Bytes(data),
        ],
    );
    Ok(TxRequest::call(profile.access_token, Bytes::from(encoded)))
}
