use std::fs;
use std::path::Path;

use bitcoin::Network as BitcoinNetwork;
use serde::Deserialize;

use crate::error::AppError;

// Bitcoin Coreのデフォルトダスト閾値 (P2PKH/P2WPKH出力に対して)
pub const DEFAULT_DUST_THRESHOLD_SATS: u64 = 546;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub dust_threshold_sats: u64,
    pub http_timeout_secs: u64,
    pub esplora_api_mainnet: String,
    pub esplora_api_testnet: String,
    pub slipstream_url: String,
    pub coingecko_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            dust_threshold_sats: DEFAULT_DUST_THRESHOLD_SATS,
            http_timeout_secs: 10,
            esplora_api_mainnet: "https://mempool.space/api".to_string(),
            esplora_api_testnet: "https://mempool.space/testnet/api".to_string(),
            slipstream_url: "https://slipstream.mara.com/rest-api/getinfo".to_string(),
            coingecko_url: "https://api.coingecko.com/api/v3/simple/price".to_string(),
        }
    }
}

impl AppConfig {
    /// `--config` が指定されていればJSONを読み込み、なければデフォルト値を使う
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let Some(path) = path else {
            log::debug!("設定ファイルの指定がないためデフォルト設定を使用します。");
            return Ok(AppConfig::default());
        };

        let content = fs::read_to_string(path).map_err(|e| {
            log::error!("設定ファイルの読み込みに失敗しました: {:?}", path);
            AppError::Io(e)
        })?;
        let config: AppConfig = serde_json::from_str(&content).map_err(|e| AppError::JsonParse {
            file_path: path.to_path_buf(),
            source: e,
        })?;
        log::debug!("設定ファイルのパース成功: {:?}", config);
        Ok(config)
    }

    pub fn esplora_api(&self, network: BitcoinNetwork) -> &str {
        match network {
            BitcoinNetwork::Bitcoin => &self.esplora_api_mainnet,
            _ => &self.esplora_api_testnet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{ "dustThresholdSats": 1000 }"#).unwrap();
        assert_eq!(config.dust_threshold_sats, 1000);
        assert_eq!(config.http_timeout_secs, 10);
        assert_eq!(config.esplora_api(BitcoinNetwork::Bitcoin), "https://mempool.space/api");
        assert_eq!(config.esplora_api(BitcoinNetwork::Testnet), "https://mempool.space/testnet/api");
    }

    #[test]
    fn no_path_means_defaults() {
        assert_eq!(AppConfig::load(None).unwrap(), AppConfig::default());
    }
}
