use std::collections::HashMap;
use std::fmt::{self, Debug};

use alloy::primitives::Address;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// A token is identified by its contract address
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Display, Serialize, Deserialize)]
#[display("{_0}")]
pub struct TokenId(pub Address);

impl Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Address> for TokenId {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl TokenId {
    /// The underlying contract address
    #[must_use]
    pub const fn address(&self) -> Address {
        self.0
    }
}

/// Name, symbol and decimals of a token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Token contract
    pub address: TokenId,
    /// Full name, `"Unknown"` when the contract does not report one
    pub name: String,
    /// Ticker, `"---"` when the contract does not report one
    pub symbol: String,
    /// Decimals, 18 when the contract does not report them
    pub decimals: u8,
}

impl TokenInfo {
    /// Metadata for a token we know nothing about
    #[must_use]
    pub fn unknown(address: TokenId) -> Self {
        Self {
            address,
            name: "Unknown".to_string(),
            symbol: "---".to_string(),
            decimals: 18,
        }
    }
}

/// Token metadata keyed by address. Lookups never fail.
#[derive(Clone, Debug, Default)]
pub struct TokenBook {
    infos: HashMap<TokenId, TokenInfo>,
}

impl TokenBook {
    /// Builds a book from already loaded metadata
    #[must_use]
    pub fn new(infos: impl IntoIterator<Item = TokenInfo>) -> Self {
        Self {
            infos: infos.into_iter().map(|info| (info.address, info)).collect(),
        }
    }

    /// Metadata for `token`, or the defaults if it was never loaded
    #[must_use]
    pub fn get(&self, token: TokenId) -> TokenInfo {
        self.infos
            .get(&token)
            .cloned()
            .unwrap_or_else(|| TokenInfo::unknown(token))
    }

    /// Symbol shortcut used when rendering paths
    #[must_use]
    pub fn symbol(&self, token: TokenId) -> String {
        self.infos
            .get(&token)
            .map_or_else(|| "---".to_string(), |info| info.symbol.clone())
    }

    /// Whether metadata for `token` is present
    #[must_use]
    pub fn contains(&self, token: TokenId) -> bool {
        self.infos.contains_key(&token)
    }

    /// Number of known tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether the book is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// All known metadata
    pub fn iter(&self) -> impl Iterator<Item = &TokenInfo> {
        self.infos.values()
    }
}
