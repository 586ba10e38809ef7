//! mempool.space (esplora互換API)、Slipstream、CoinGecko を使う外部プロバイダの実装。
//! 再試行は行わない。失敗はそのまま呼び出し元に返す。

use std::str::FromStr;
use std::time::Duration;

use bitcoin::{Address, Network as BitcoinNetwork, Txid};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::{
    classify::classify_address,
    config::AppConfig,
    error::AppError,
    provider::{FeeQuoteProvider, PriceProvider, UtxoProvider},
    types::{QuoteSource, Utxo},
};

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct AddressInfo {
    chain_stats: TxoStats,
}

#[derive(Debug, Deserialize)]
struct TxoStats {
    funded_txo_sum: u64,
    spent_txo_sum: u64,
}

#[derive(Debug, Deserialize)]
struct MempoolFees {
    #[serde(rename = "fastestFee")]
    fastest_fee: f64,
}

#[derive(Debug, Deserialize)]
struct SlipstreamInfo {
    fee_rate: f64,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoPrice {
    bitcoin: CoinGeckoQuote,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoQuote {
    usd: f64,
}

pub struct HttpProviders {
    client: Client,
    config: AppConfig,
}

impl HttpProviders {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("HTTPクライアントの作成に失敗: {}", e)))?;
        Ok(HttpProviders {
            client,
            config: config.clone(),
        })
    }

    fn get_text(&self, url: &str) -> Result<String, String> {
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(format!("HTTP {}: {}", status, body));
        }
        response.text().map_err(|e| e.to_string())
    }
}

impl UtxoProvider for HttpProviders {
    fn get_utxos(&self, address: &Address, network: BitcoinNetwork) -> Result<Vec<Utxo>, AppError> {
        let url = format!("{}/address/{}/utxo", self.config.esplora_api(network), address);
        let body = self.get_text(&url).map_err(AppError::UtxoUnavailable)?;
        let utxos = parse_utxos(&body, address)?;
        log::info!("{} のUTXOを {} 件取得しました。", address, utxos.len());
        Ok(utxos)
    }

    fn get_balance(&self, address: &Address, network: BitcoinNetwork) -> Result<u64, AppError> {
        let url = format!("{}/address/{}", self.config.esplora_api(network), address);
        let body = self.get_text(&url).map_err(AppError::UtxoUnavailable)?;
        parse_balance(&body)
    }
}

impl FeeQuoteProvider for HttpProviders {
    fn get_recommended_rate(&self, source: QuoteSource, network: BitcoinNetwork) -> Result<f64, AppError> {
        let unavailable = |reason: String| AppError::QuoteUnavailable {
            source_name: source.as_str().to_string(),
            reason,
        };
        match source {
            QuoteSource::Mempool => {
                let url = format!("{}/v1/fees/recommended", self.config.esplora_api(network));
                let body = self.get_text(&url).map_err(unavailable)?;
                parse_mempool_fees(&body)
            }
            QuoteSource::Slipstream => {
                if network != BitcoinNetwork::Bitcoin {
                    log::warn!("Slipstreamはメインネットの手数料率を返します。");
                }
                let body = self.get_text(&self.config.slipstream_url).map_err(unavailable)?;
                parse_slipstream_info(&body)
            }
        }
    }
}

impl PriceProvider for HttpProviders {
    fn get_btc_usd_price(&self) -> Result<f64, AppError> {
        let url = format!("{}?ids=bitcoin&vs_currencies=usd", self.config.coingecko_url);
        let body = self.get_text(&url).map_err(AppError::PriceUnavailable)?;
        parse_coingecko_price(&body)
    }
}

fn parse_utxos(body: &str, address: &Address) -> Result<Vec<Utxo>, AppError> {
    let script_type = classify_address(address)?;
    let raw: Vec<EsploraUtxo> = serde_json::from_str(body)
        .map_err(|e| AppError::UtxoUnavailable(format!("UTXOレスポンスの解析に失敗: {}", e)))?;
    raw.into_iter()
        .map(|u| {
            let txid = Txid::from_str(&u.txid)
                .map_err(|e| AppError::UtxoUnavailable(format!("無効なTXID形式 ({}): {}", u.txid, e)))?;
            Ok(Utxo {
                txid,
                vout: u.vout,
                amount_sats: u.value,
                script_type,
            })
        })
        .collect()
}

fn parse_balance(body: &str) -> Result<u64, AppError> {
    let info: AddressInfo = serde_json::from_str(body)
        .map_err(|e| AppError::UtxoUnavailable(format!("残高レスポンスの解析に失敗: {}", e)))?;
    info.chain_stats
        .funded_txo_sum
        .checked_sub(info.chain_stats.spent_txo_sum)
        .ok_or_else(|| AppError::UtxoUnavailable("使用済み合計が受取合計を超えています".to_string()))
}

fn parse_mempool_fees(body: &str) -> Result<f64, AppError> {
    let fees: MempoolFees = serde_json::from_str(body).map_err(|e| AppError::QuoteUnavailable {
        source_name: QuoteSource::Mempool.as_str().to_string(),
        reason: format!("レスポンスの解析に失敗: {}", e),
    })?;
    Ok(fees.fastest_fee)
}

fn parse_slipstream_info(body: &str) -> Result<f64, AppError> {
    let info: SlipstreamInfo = serde_json::from_str(body).map_err(|e| AppError::QuoteUnavailable {
        source_name: QuoteSource::Slipstream.as_str().to_string(),
        reason: format!("レスポンスの解析に失敗: {}", e),
    })?;
    Ok(info.fee_rate)
}

fn parse_coingecko_price(body: &str) -> Result<f64, AppError> {
    let price: CoinGeckoPrice = serde_json::from_str(body)
        .map_err(|e| AppError::PriceUnavailable(format!("レスポンスの解析に失敗: {}", e)))?;
    Ok(price.bitcoin.usd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classify::parse_address, types::ScriptType};

    #[test]
    fn esplora_utxos_are_tagged_with_the_address_script_type() {
        let address = parse_address("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx", BitcoinNetwork::Testnet).unwrap();
        let body = format!(
            r#"[{{"txid":"{}","vout":1,"status":{{"confirmed":true,"block_height":100}},"value":1500}},
                {{"txid":"{}","vout":0,"status":{{"confirmed":false}},"value":2500}}]"#,
            "aa".repeat(32),
            "bb".repeat(32)
        );
        let utxos = parse_utxos(&body, &address).unwrap();
        assert_eq!(utxos.len(), 2);
        assert_eq!(utxos[0].vout, 1);
        assert_eq!(utxos[1].amount_sats, 2_500);
        assert!(utxos.iter().all(|u| u.script_type == ScriptType::Segwit));
    }

    #[test]
    fn malformed_utxo_body_is_unavailable() {
        let address = parse_address("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx", BitcoinNetwork::Testnet).unwrap();
        assert!(matches!(parse_utxos("<html>", &address), Err(AppError::UtxoUnavailable(_))));
        let bad_txid = r#"[{"txid":"xyz","vout":0,"value":1}]"#;
        assert!(matches!(parse_utxos(bad_txid, &address), Err(AppError::UtxoUnavailable(_))));
    }

    #[test]
    fn balance_is_funded_minus_spent() {
        let body = r#"{"address":"x","chain_stats":{"funded_txo_count":2,"funded_txo_sum":90000,"spent_txo_count":1,"spent_txo_sum":30000,"tx_count":3},
                      "mempool_stats":{"funded_txo_sum":0,"spent_txo_sum":0}}"#;
        assert_eq!(parse_balance(body).unwrap(), 60_000);
    }

    #[test]
    fn quote_bodies_are_parsed() {
        let mempool = r#"{"fastestFee":12,"halfHourFee":8,"hourFee":5,"economyFee":2,"minimumFee":1}"#;
        assert_eq!(parse_mempool_fees(mempool).unwrap(), 12.0);
        assert_eq!(parse_slipstream_info(r#"{"fee_rate":2.5,"status":"ok"}"#).unwrap(), 2.5);
    }

    #[test]
    fn malformed_quote_bodies_are_unavailable() {
        assert!(matches!(parse_mempool_fees(r#"{"halfHourFee":8}"#), Err(AppError::QuoteUnavailable { .. })));
        assert!(matches!(parse_slipstream_info("not json"), Err(AppError::QuoteUnavailable { .. })));
    }

    #[test]
    fn coingecko_price_is_parsed() {
        assert_eq!(parse_coingecko_price(r#"{"bitcoin":{"usd":64250.5}}"#).unwrap(), 64_250.5);
        assert!(matches!(parse_coingecko_price(r#"{"ethereum":{"usd":1}}"#), Err(AppError::PriceUnavailable(_))));
    }
}
