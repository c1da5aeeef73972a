use std::collections::HashSet;
use std::fs;
use std::path::Path;

use alloy::network::Ethereum;
use alloy::providers::RootProvider;
use eyre::Result;
use log::info;

use crate::arb::flash_loan::IERC20;
use crate::arb::token::{TokenBook, TokenId, TokenInfo};
use crate::utils::batch::batch;
use crate::utils::constants::TOKEN_BATCH;

/// Name of the token metadata cache inside the data directory
pub const TOKENS_FILE: &str = "tokens.json";

/// Reads name, symbol and decimals. Each call that fails keeps the
/// default of [`TokenInfo::unknown`].
pub async fn fetch_token(provider: &RootProvider<Ethereum>, token: TokenId) -> TokenInfo {
    let contract = IERC20::new(token.0, provider);
    let mut info = TokenInfo::unknown(token);

    if let Ok(name) = contract.name().call().await {
        info.name = name._0;
    }
    if let Ok(symbol) = contract.symbol().call().await {
        info.symbol = symbol._0;
    }
    if let Ok(decimals) = contract.decimals().call().await {
        info.decimals = decimals._0;
    }
    info
}

/// Metadata of `tokens`, from `<data_dir>/tokens.json` first, then from the
/// chain. Newly fetched tokens are appended to the cache.
///
/// # Errors
/// * Unreadable or unwritable cache
pub async fn load_tokens(
    provider: &RootProvider<Ethereum>,
    data_dir: &Path,
    tokens: &HashSet<TokenId>,
) -> Result<TokenBook> {
    let path = data_dir.join(TOKENS_FILE);
    let mut infos: Vec<TokenInfo> = if path.exists() {
        serde_json::from_str(&fs::read_to_string(&path)?)?
    } else {
        Vec::new()
    };

    let known: HashSet<TokenId> = infos.iter().map(|info| info.address).collect();
    let missing: Vec<TokenId> = tokens.iter().filter(|token| !known.contains(token)).copied().collect();

    if !missing.is_empty() {
        info!("bootstrap::tokens: loading {} tokens", missing.len());
        let fetched = batch(
            &missing,
            TOKEN_BATCH,
            |token| {
                let token = *token;
                async move { Ok(fetch_token(provider, token).await) }
            },
            true,
        )
        .await?;
        infos.extend(fetched);

        fs::create_dir_all(data_dir)?;
        fs::write(&path, serde_json::to_string(&infos)?)?;
    }

    Ok(TokenBook::new(infos))
}
