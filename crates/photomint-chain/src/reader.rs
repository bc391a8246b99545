//! Typed reads over the deployed contract set.
//!
//! Every read encodes one call, hands the return data to a schema-driven
//! decode and maps structural violations to [`StructParseError`]. Galleries
//! are assembled by paging until the declared total is covered (or until a
//! short page where the contract declares none) and are returned as whole
//! snapshots.

use std::sync::Arc;

use async_trait::async_trait;
use photomint_abi::{encode_call, Arg, Decoder};
use photomint_core::{
    Address, ChainProfile, CollectionPayload, OperationKind, PrivateCollectionRecord,
    PrivateGallery, PublicCollectionRecord, PublicGallery, Result, StructParseError, TokenPayload,
    TokenRecord, TokenSource, B256, U256,
};

use crate::rpc::NodeRpc;

/// Records requested per page when assembling a gallery.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

const SIG_TOTAL_TOKENS: &str = "totalTokens()";
const SIG_TOKENS_COUNT: &str = "tokensCount()";
const SIG_BALANCE_OF: &str = "balanceOf(address)";
const SIG_ALLOWANCE: &str = "allowance(address,address)";
const SIG_COLLECTION_PRICE: &str = "collectionPrice()";
const SIG_PREDICT_ADDRESS: &str = "predictDeterministicAddress(bytes32)";
const SIG_PUBLIC_TOKENS: &str = "getSelfPublicTokens(uint256,uint256)";
const SIG_SELF_COLLECTIONS: &str = "getSelfCollections(uint256,uint256)";
const SIG_SELF_TOKENS: &str = "getSelfTokens(uint256[],uint256[],uint256[])";

/// One decoded page of the public token feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicTokensPage {
    /// Router implementation versions, identical on every page
    pub collections: Vec<PublicCollectionRecord>,
    /// Tokens on this page, flattened in version order
    pub tokens: Vec<TokenRecord>,
    /// Total owned tokens across all pages
    pub total: U256,
}

/// Read surface the engine and observers poll against.
///
/// The scalar methods are the confirmation metrics; the page methods feed
/// the gallery assembly provided by the default methods. Mocks override
/// the page methods (and usually [`LedgerReads::metric`]) and inherit the
/// paging logic unchanged.
#[async_trait]
pub trait LedgerReads: Send + Sync {
    /// Owned public token count across router versions.
    async fn public_token_total(&self, account: Address) -> Result<U256>;

    /// Owned token count across the account's private collections.
    async fn private_token_total(&self, account: Address) -> Result<U256>;

    /// Number of private collections the account owns.
    async fn private_collection_count(&self, account: Address) -> Result<U256>;

    /// Native coin balance.
    async fn native_balance(&self, account: Address) -> Result<U256>;

    /// Utility token balance.
    async fn token_balance(&self, account: Address) -> Result<U256>;

    /// Utility tokens the collection factory may spend for `owner`.
    async fn allowance(&self, owner: Address) -> Result<U256>;

    /// Current price of deploying a private collection, in utility tokens.
    async fn collection_price(&self) -> Result<U256>;

    /// Address the factory will deploy to for `salt`.
    async fn predict_collection_address(&self, salt: B256) -> Result<Address>;

    /// One page of the account's public tokens.
    async fn public_tokens_page(
        &self,
        account: Address,
        page: u64,
        size: u64,
    ) -> Result<PublicTokensPage>;

    /// One page of the account's private collections.
    async fn private_collections_page(
        &self,
        account: Address,
        page: u64,
        size: u64,
    ) -> Result<Vec<PrivateCollectionRecord>>;

    /// Full-page token read across the given private collections.
    async fn private_tokens(
        &self,
        account: Address,
        collections: &[PrivateCollectionRecord],
    ) -> Result<Vec<TokenRecord>>;

    /// Page size used when assembling galleries.
    fn page_size(&self) -> u64 {
        DEFAULT_PAGE_SIZE
    }

    /// The poll metric observed after submitting an operation of `kind`.
    async fn metric(&self, account: Address, kind: OperationKind) -> Result<U256> {
        match kind {
            OperationKind::PublicMint => self.public_token_total(account).await,
            OperationKind::PrivateMint => self.private_token_total(account).await,
            OperationKind::Approve => self.allowance(account).await,
            OperationKind::PurchaseCollection => self.private_collection_count(account).await,
            OperationKind::FaucetClaim => self.native_balance(account).await,
        }
    }

    /// All public tokens of `account`, paged until the declared total is
    /// covered. Always issues at least one read so an empty account yields
    /// an empty snapshot with a zero total.
    async fn public_gallery(&self, account: Address) -> Result<PublicGallery> {
        let size = self.page_size();
        let mut page = 0u64;
        let mut collections = Vec::new();
        let mut tokens = Vec::new();
        let mut total = U256::ZERO;
        loop {
            let view = self.public_tokens_page(account, page, size).await?;
            collections = view.collections;
            total = view.total;
            tokens.extend(view.tokens);
            page += 1;
            if U256::from(page) * U256::from(size) >= total {
                break;
            }
        }
        Ok(PublicGallery {
            collections,
            tokens,
            total,
        })
    }

    /// All private collections of `account` with their tokens. The
    /// collection listing declares no total, so paging stops at the first
    /// short page.
    async fn private_gallery(&self, account: Address) -> Result<PrivateGallery> {
        let size = self.page_size();
        let mut page = 0u64;
        let mut collections: Vec<PrivateCollectionRecord> = Vec::new();
        loop {
            let batch = self.private_collections_page(account, page, size).await?;
            let short = (batch.len() as u64) < size;
            collections.extend(batch);
            page += 1;
            if short {
                break;
            }
        }
        if collections.is_empty() {
            return Ok(PrivateGallery {
                collections,
                tokens: Vec::new(),
            });
        }
        let tokens = self.private_tokens(account, &collections).await?;
        Ok(PrivateGallery {
            collections,
            tokens,
        })
    }
}

/// Production reads against the profile's deployed contracts.
pub struct LedgerReader {
    rpc: Arc<dyn NodeRpc>,
    profile: ChainProfile,
}

impl LedgerReader {
    /// Reader over `rpc` for the contracts in `profile`.
    pub fn new(rpc: Arc<dyn NodeRpc>, profile: ChainProfile) -> Self {
        Self { rpc, profile }
    }

    async fn view(
        &self,
        from: Option<Address>,
        to: Address,
        signature: &'static str,
        args: &[Arg],
    ) -> Result<Vec<u8>> {
        let data = encode_call(signature, args);
        self.rpc.call(from, to, data.to_vec()).await
    }

    async fn view_uint(
        &self,
        from: Option<Address>,
        to: Address,
        signature: &'static str,
        args: &[Arg],
    ) -> Result<U256> {
        let data = self.view(from, to, signature, args).await?;
        Ok(Decoder::new(signature, &data).uint(0)?)
    }
}

#[async_trait]
impl LedgerReads for LedgerReader {
    async fn public_token_total(&self, account: Address) -> Result<U256> {
        self.view_uint(Some(account), self.profile.router, SIG_TOTAL_TOKENS, &[])
            .await
    }

    async fn private_token_total(&self, account: Address) -> Result<U256> {
        self.view_uint(
            Some(account),
            self.profile.access_token,
            SIG_TOKENS_COUNT,
            &[],
        )
        .await
    }

    async fn private_collection_count(&self, account: Address) -> Result<U256> {
        self.view_uint(
            None,
            self.profile.access_token,
            SIG_BALANCE_OF,
            &[Arg::Addr(account)],
        )
        .await
    }

    async fn native_balance(&self, account: Address) -> Result<U256> {
        self.rpc.balance(account).await
    }

    async fn token_balance(&self, account: Address) -> Result<U256> {
        self.view_uint(
            None,
            self.profile.utility_token,
            SIG_BALANCE_OF,
            &[Arg::Addr(account)],
        )
        .await
    }

    async fn allowance(&self, owner: Address) -> Result<U256> {
        self.view_uint(
            None,
            self.profile.utility_token,
            SIG_ALLOWANCE,
            &[Arg::Addr(owner), Arg::Addr(self.profile.access_token)],
        )
        .await
    }

    async fn collection_price(&self) -> Result<U256> {
        self.view_uint(None, self.profile.access_token, SIG_COLLECTION_PRICE, &[])
            .await
    }

    async fn predict_collection_address(&self, salt: B256) -> Result<Address> {
        let data = self
            .view(
                None,
                self.profile.access_token,
                SIG_PREDICT_ADDRESS,
                &[Arg::Word(salt)],
            )
            .await?;
        Ok(Decoder::new(SIG_PREDICT_ADDRESS, &data).address(0)?)
    }

    async fn public_tokens_page(
        &self,
        account: Address,
        page: u64,
        size: u64,
    ) -> Result<PublicTokensPage> {
        tracing::debug!(%account, page, size, "reading public token page");
        let data = self
            .view(
                Some(account),
                self.profile.router,
                SIG_PUBLIC_TOKENS,
                &[Arg::Uint(U256::from(page)), Arg::Uint(U256::from(size))],
            )
            .await?;
        decode_public_page(&data)
    }

    async fn private_collections_page(
        &self,
        account: Address,
        page: u64,
        size: u64,
    ) -> Result<Vec<PrivateCollectionRecord>> {
        tracing::debug!(%account, page, size, "reading private collection page");
        let data = self
            .view(
                Some(account),
                self.profile.access_token,
                SIG_SELF_COLLECTIONS,
                &[Arg::Uint(U256::from(page)), Arg::Uint(U256::from(size))],
            )
            .await?;
        decode_private_collections(&data)
    }

    async fn private_tokens(
        &self,
        account: Address,
        collections: &[PrivateCollectionRecord],
    ) -> Result<Vec<TokenRecord>> {
        let ids = collections.iter().map(|c| c.id).collect::<Vec<_>>();
        let pages = vec![U256::ZERO; collections.len()];
        let sizes = collections
            .iter()
            .map(|c| c.token_count)
            .collect::<Vec<_>>();
        let data = self
            .view(
                Some(account),
                self.profile.access_token,
                SIG_SELF_TOKENS,
                &[
                    Arg::UintArray(ids),
                    Arg::UintArray(pages),
                    Arg::UintArray(sizes),
                ],
            )
            .await?;
        decode_token_matrix(&data, collections)
    }
}

fn payload_error(method: &'static str, id: U256, err: serde_json::Error) -> StructParseError {
    StructParseError::new(method, format!("token {id} payload: {err}"))
}

/// Decodes `((address, uint256)[], (uint256, string, bytes)[][], uint256)`
/// and flattens the per-version token pages in version order.
fn decode_public_page(data: &[u8]) -> Result<PublicTokensPage> {
    let root = Decoder::new(SIG_PUBLIC_TOKENS, data);

    let collection_area = root.tail(0)?;
    let collection_count = collection_area.array_len()?;
    let mut collections = Vec::with_capacity(collection_count);
    for index in 0..collection_count {
        let item = collection_area.static_item(index, 2)?;
        collections.push(PublicCollectionRecord {
            address: item.address(0)?,
            version: item.uint_u64(1)?,
        });
    }

    let pages_area = root.tail(1)?;
    let page_count = pages_area.array_len()?;
    if page_count != collection_count {
        return Err(StructParseError::new(
            SIG_PUBLIC_TOKENS,
            format!("{collection_count} collections zipped with {page_count} token pages"),
        )
        .into());
    }

    let mut tokens = Vec::new();
    for (index, collection) in collections.iter().enumerate() {
        let inner = pages_area.dyn_item(index)?;
        let inner_len = inner.array_len()?;
        for token_index in 0..inner_len {
            let tuple = inner.dyn_item(token_index)?;
            let id = tuple.uint(0)?;
            let meta_uri = tuple.string_tail(1)?;
            let raw = tuple.bytes_tail(2)?;
            let payload = TokenPayload::from_json(&raw)
                .map_err(|e| payload_error(SIG_PUBLIC_TOKENS, id, e))?;
            tokens.push(TokenRecord {
                id,
                meta_uri,
                payload,
                collection: collection.address,
                source: TokenSource::Public {
                    version: collection.version,
                },
            });
        }
    }

    let total = root.uint(2)?;
    Ok(PublicTokensPage {
        collections,
        tokens,
        total,
    })
}

/// Decodes `((uint256, address, bytes)[], uint256[])`, zipping declared
/// token counts with the collection tuples.
fn decode_private_collections(data: &[u8]) -> Result<Vec<PrivateCollectionRecord>> {
    let root = Decoder::new(SIG_SELF_COLLECTIONS, data);

    let collection_area = root.tail(0)?;
    let collection_count = collection_area.array_len()?;

    let counts = root.tail(1)?.uint_array()?;
    if counts.len() != collection_count {
        return Err(StructParseError::new(
            SIG_SELF_COLLECTIONS,
            format!(
                "{collection_count} collections zipped with {} counts",
                counts.len()
            ),
        )
        .into());
    }

    let mut records = Vec::with_capacity(collection_count);
    for (index, token_count) in counts.into_iter().enumerate() {
        let tuple = collection_area.dyn_item(index)?;
        let id = tuple.uint(0)?;
        let address = tuple.address(1)?;
        let raw = tuple.bytes_tail(2)?;
        let payload = CollectionPayload::from_json(&raw)
            .map_err(|e| payload_error(SIG_SELF_COLLECTIONS, id, e))?;
        records.push(PrivateCollectionRecord {
            id,
            address,
            payload,
            token_count,
        });
    }
    Ok(records)
}

/// Decodes `(uint256, string, bytes)[][]`, one page per requested
/// collection, tagging each token with its collection.
fn decode_token_matrix(
    data: &[u8],
    collections: &[PrivateCollectionRecord],
) -> Result<Vec<TokenRecord>> {
    let root = Decoder::new(SIG_SELF_TOKENS, data);
    let pages_area = root.tail(0)?;
    let page_count = pages_area.array_len()?;
    if page_count != collections.len() {
        return Err(StructParseError::new(
            SIG_SELF_TOKENS,
            format!(
                "{} collections zipped with {page_count} token pages",
                collections.len()
            ),
        )
        .into());
    }

    let mut tokens = Vec::new();
    for (index, collection) in collections.iter().enumerate() {
        let inner = pages_area.dyn_item(index)?;
        let inner_len = inner.array_len()?;
        for token_index in 0..inner_len {
            let tuple = inner.dyn_item(token_index)?;
            let id = tuple.uint(0)?;
            let meta_uri = tuple.string_tail(1)?;
            let raw = tuple.bytes_tail(2)?;
            let payload =
                TokenPayload::from_json(&raw).map_err(|e| payload_error(SIG_SELF_TOKENS, id, e))?;
            tokens.push(TokenRecord {
                id,
                meta_uri,
                payload,
                collection: collection.address,
                source: TokenSource::Private {
                    collection_name: collection.payload.name.clone(),
                },
            });
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use photomint_core::EngineError;
    use proptest::prelude::*;

    use super::*;

    fn word(value: u64) -> Vec<u8> {
        U256::from(value).to_be_bytes::<32>().to_vec()
    }

    /// Length word, relative element offsets, then the element regions.
    fn dyn_array(items: &[Vec<u8>]) -> Vec<u8> {
        let mut out = word(items.len() as u64);
        let mut offset = items.len() as u64 * 32;
        for item in items {
            out.extend_from_slice(&word(offset));
            offset += item.len() as u64;
        }
        for item in items {
            out.extend_from_slice(item);
        }
        out
    }

    fn token_tuple(id: u64, meta: &str, data: &[u8]) -> Vec<u8> {
        photomint_abi::encode_args(&[
            Arg::Uint(U256::from(id)),
            Arg::Str(meta.to_string()),
            Arg::Bytes(data.to_vec()),
        ])
    }

    fn payload_json(name: &str) -> Vec<u8> {
        format!("{{\"name\":\"{name}\",\"createDate\":1,\"mediaId\":\"m\"}}").into_bytes()
    }

    /// Hand-assembled `getSelfPublicTokens` return data.
    fn public_response(versions: &[(Address, u64, Vec<Vec<u8>>)], total: u64) -> Vec<u8> {
        let mut collection_area = word(versions.len() as u64);
        for (address, version, _) in versions {
            collection_area.extend_from_slice(&[0u8; 12]);
            collection_area.extend_from_slice(address.as_slice());
            collection_area.extend_from_slice(&word(*version));
        }
        let pages: Vec<Vec<u8>> = versions
            .iter()
            .map(|(_, _, tuples)| dyn_array(tuples))
            .collect();
        let pages_area = dyn_array(&pages);

        let mut out = Vec::new();
        out.extend_from_slice(&word(96));
        out.extend_from_slice(&word(96 + collection_area.len() as u64));
        out.extend_from_slice(&word(total));
        out.extend_from_slice(&collection_area);
        out.extend_from_slice(&pages_area);
        out
    }

    /// Hand-assembled `getSelfCollections` return data.
    fn collections_response(tuples: &[Vec<u8>], counts: &[u64]) -> Vec<u8> {
        let collection_area = dyn_array(tuples);
        let mut counts_area = word(counts.len() as u64);
        for count in counts {
            counts_area.extend_from_slice(&word(*count));
        }
        let mut out = Vec::new();
        out.extend_from_slice(&word(64));
        out.extend_from_slice(&word(64 + collection_area.len() as u64));
        out.extend_from_slice(&collection_area);
        out.extend_from_slice(&counts_area);
        out
    }

    fn collection_tuple(id: u64, address: Address, data: &[u8]) -> Vec<u8> {
        photomint_abi::encode_args(&[
            Arg::Uint(U256::from(id)),
            Arg::Addr(address),
            Arg::Bytes(data.to_vec()),
        ])
    }

    #[test]
    fn public_page_flattens_versions_in_order() {
        let v0 = Address::repeat_byte(0x11);
        let v1 = Address::repeat_byte(0x22);
        let data = public_response(
            &[
                (v0, 0, vec![token_tuple(5, "meta://5", &payload_json("five"))]),
                (
                    v1,
                    1,
                    vec![
                        token_tuple(1, "meta://1", &payload_json("one")),
                        token_tuple(2, "meta://2", &payload_json("two")),
                    ],
                ),
            ],
            3,
        );

        let page = decode_public_page(&data).unwrap();
        assert_eq!(page.total, U256::from(3u64));
        assert_eq!(page.collections.len(), 2);
        assert_eq!(page.collections[1].version, 1);
        let names: Vec<&str> = page.tokens.iter().map(|t| t.payload.name.as_str()).collect();
        assert_eq!(names, vec!["five", "one", "two"]);
        assert_eq!(page.tokens[0].collection, v0);
        assert_matches!(page.tokens[2].source, TokenSource::Public { version: 1 });
    }

    #[test]
    fn collection_tuple_missing_its_data_field_is_rejected() {
        // Tuple carries only (uint256, address) where three fields are
        // declared; the bytes offset read walks off the region.
        let short_tuple = photomint_abi::encode_args(&[
            Arg::Uint(U256::from(9u64)),
            Arg::Addr(Address::repeat_byte(0x33)),
        ]);
        let data = collections_response(&[short_tuple], &[4]);
        assert_matches!(
            decode_private_collections(&data),
            Err(EngineError::StructParse(e)) if e.method == SIG_SELF_COLLECTIONS
        );
    }

    #[test]
    fn count_zip_mismatch_is_rejected() {
        let tuple = collection_tuple(7, Address::repeat_byte(0x44), b"{\"name\":\"a\"}");
        let data = collections_response(&[tuple.clone(), tuple], &[4]);
        let err = decode_private_collections(&data).unwrap_err();
        assert_matches!(
            err,
            EngineError::StructParse(e) if e.detail.contains("zipped with 1 counts")
        );
    }

    #[test]
    fn malformed_collection_payload_rejects_the_read() {
        let tuple = collection_tuple(3, Address::repeat_byte(0x55), b"not json");
        let data = collections_response(&[tuple], &[0]);
        assert_matches!(
            decode_private_collections(&data),
            Err(EngineError::StructParse(e)) if e.detail.contains("payload")
        );
    }

    #[test]
    fn token_matrix_tags_tokens_with_their_collection() {
        let record = PrivateCollectionRecord {
            id: U256::from(7u64),
            address: Address::repeat_byte(0x66),
            payload: CollectionPayload {
                name: "birds".into(),
            },
            token_count: U256::from(1u64),
        };
        let page = dyn_array(&[token_tuple(0, "meta://b", &payload_json("robin"))]);
        let mut data = word(32);
        data.extend_from_slice(&dyn_array(&[page]));

        let tokens = decode_token_matrix(&data, std::slice::from_ref(&record)).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].collection, record.address);
        assert_matches!(
            &tokens[0].source,
            TokenSource::Private { collection_name } if collection_name == "birds"
        );
    }

    #[test]
    fn matrix_page_count_must_match_requested_collections() {
        let record = PrivateCollectionRecord {
            id: U256::from(1u64),
            address: Address::repeat_byte(0x77),
            payload: CollectionPayload { name: "x".into() },
            token_count: U256::ZERO,
        };
        let mut data = word(32);
        data.extend_from_slice(&dyn_array(&[]));
        let err = decode_token_matrix(&data, std::slice::from_ref(&record)).unwrap_err();
        assert_matches!(err, EngineError::StructParse(_));
    }

    struct PagedFixture {
        tokens: Vec<TokenRecord>,
        size: u64,
    }

    impl PagedFixture {
        fn with_tokens(count: u64, size: u64) -> Self {
            let collection = Address::repeat_byte(0xab);
            let tokens = (0..count)
                .map(|i| TokenRecord {
                    id: U256::from(i),
                    meta_uri: format!("meta://{i}"),
                    payload: TokenPayload {
                        name: format!("t{i}"),
                        create_date: i,
                        media_id: format!("m{i}"),
                    },
                    collection,
                    source: TokenSource::Public { version: 0 },
                })
                .collect();
            Self { tokens, size }
        }
    }

    #[async_trait]
    impl LedgerReads for PagedFixture {
        async fn public_token_total(&self, _account: Address) -> Result<U256> {
            Ok(U256::from(self.tokens.len()))
        }
        async fn private_token_total(&self, _account: Address) -> Result<U256> {
            Ok(U256::ZERO)
        }
        async fn private_collection_count(&self, _account: Address) -> Result<U256> {
            Ok(U256::ZERO)
        }
        async fn native_balance(&self, _account: Address) -> Result<U256> {
            Ok(U256::ZERO)
        }
        async fn token_balance(&self, _account: Address) -> Result<U256> {
            Ok(U256::ZERO)
        }
        async fn allowance(&self, _owner: Address) -> Result<U256> {
            Ok(U256::ZERO)
        }
        async fn collection_price(&self) -> Result<U256> {
            Ok(U256::ZERO)
        }
        async fn predict_collection_address(&self, _salt: B256) -> Result<Address> {
            Ok(Address::ZERO)
        }
        async fn public_tokens_page(
            &self,
            _account: Address,
            page: u64,
            size: u64,
        ) -> Result<PublicTokensPage> {
            let start = (page * size) as usize;
            let end = start.saturating_add(size as usize).min(self.tokens.len());
            let tokens = if start >= self.tokens.len() {
                Vec::new()
            } else {
                self.tokens[start..end].to_vec()
            };
            Ok(PublicTokensPage {
                collections: vec![PublicCollectionRecord {
                    address: Address::repeat_byte(0xab),
                    version: 0,
                }],
                tokens,
                total: U256::from(self.tokens.len()),
            })
        }
        async fn private_collections_page(
            &self,
            _account: Address,
            _page: u64,
            _size: u64,
        ) -> Result<Vec<PrivateCollectionRecord>> {
            Ok(Vec::new())
        }
        async fn private_tokens(
            &self,
            _account: Address,
            _collections: &[PrivateCollectionRecord],
        ) -> Result<Vec<TokenRecord>> {
            Ok(Vec::new())
        }
        fn page_size(&self) -> u64 {
            self.size
        }
    }

    #[tokio::test]
    async fn gallery_assembly_is_page_size_independent() {
        let account = Address::repeat_byte(0x01);
        let reference = PagedFixture::with_tokens(25, 25)
            .public_gallery(account)
            .await
            .unwrap();
        for size in [1, 3, 7, 10, 25, 100] {
            let gallery = PagedFixture::with_tokens(25, size)
                .public_gallery(account)
                .await
                .unwrap();
            assert_eq!(gallery, reference, "page size {size}");
        }
    }

    #[tokio::test]
    async fn empty_account_yields_empty_gallery() {
        let gallery = PagedFixture::with_tokens(0, 10)
            .public_gallery(Address::repeat_byte(0x02))
            .await
            .unwrap();
        assert!(gallery.tokens.is_empty());
        assert_eq!(gallery.total, U256::ZERO);

        let private = PagedFixture::with_tokens(0, 10)
            .private_gallery(Address::repeat_byte(0x02))
            .await
            .unwrap();
        assert!(private.collections.is_empty());
    }

    proptest! {
        // Structural fuzz: arbitrary return data may fail to decode but
        // must never panic or allocate absurdly.
        #[test]
        fn arbitrary_return_data_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = decode_public_page(&data);
            let _ = decode_private_collections(&data);
        }
    }
}
