use std::fmt;

use bitcoin::{Address, Amount, Network as BitcoinNetwork, OutPoint, Txid};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// 送金元アドレスから導かれる支払いスクリプトの種別。
///
/// サイズ見積もりと署名処理はこの列挙に対する網羅的な `match` で分岐する。
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum ScriptType {
    #[serde(rename = "legacy")]
    Legacy,
    #[serde(rename = "p2sh-segwit")]
    P2shSegwit,
    #[serde(rename = "segwit")]
    Segwit,
    #[serde(rename = "taproot")]
    Taproot,
}

impl ScriptType {
    pub const ALL: [ScriptType; 4] = [
        ScriptType::Legacy,
        ScriptType::P2shSegwit,
        ScriptType::Segwit,
        ScriptType::Taproot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptType::Legacy => "legacy",
            ScriptType::P2shSegwit => "p2sh-segwit",
            ScriptType::Segwit => "segwit",
            ScriptType::Taproot => "taproot",
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 送金元アドレスに属する使用可能な出力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    pub amount_sats: u64,
    pub script_type: ScriptType,
}

impl Utxo {
    pub fn out_point(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }

    pub fn amount(&self) -> Amount {
        Amount::from_sat(self.amount_sats)
    }
}

/// 正の整数で表した手数料率 (sats/vB)
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FeeRate(u64);

impl FeeRate {
    pub fn new(sat_per_vb: u64) -> Result<Self, AppError> {
        if sat_per_vb == 0 {
            return Err(AppError::NonPositiveFee(0));
        }
        Ok(FeeRate(sat_per_vb))
    }

    /// 外部APIの小数の見積もりを切り上げて整数化する
    pub fn from_quote(sat_per_vb: f64) -> Result<Self, AppError> {
        if !sat_per_vb.is_finite() || sat_per_vb <= 0.0 {
            return Err(AppError::NonPositiveFee(sat_per_vb.floor() as i64));
        }
        FeeRate::new(sat_per_vb.ceil() as u64)
    }

    pub fn sat_per_vb(&self) -> u64 {
        self.0
    }

    pub fn fee_for_vsize(&self, vsize: u64) -> u64 {
        self.0.saturating_mul(vsize)
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sats/vB", self.0)
    }
}

/// 手数料率の見積もり取得先
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum QuoteSource {
    Mempool,
    Slipstream,
}

impl QuoteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteSource::Mempool => "mempool",
            QuoteSource::Slipstream => "slipstream",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeeSpec {
    ExplicitRate(u64),
    ExplicitUsd(f64),
    AutoFetch(QuoteSource),
}

impl FeeSpec {
    /// 優先順位: 明示的な手数料率 > USD指定 > 外部APIからの取得
    pub fn from_options(fee_rate: Option<u64>, fee_usd: Option<f64>, fee_source: QuoteSource) -> Self {
        match (fee_rate, fee_usd) {
            (Some(rate), _) => FeeSpec::ExplicitRate(rate),
            (None, Some(usd)) => FeeSpec::ExplicitUsd(usd),
            (None, None) => FeeSpec::AutoFetch(fee_source),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SpendPlan {
    SendAll,
    SendAmount(u64),
}

impl SpendPlan {
    pub fn from_send_sats(send_sats: Option<u64>) -> Self {
        send_sats.map_or(SpendPlan::SendAll, SpendPlan::SendAmount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub address: Address,
    pub amount_sats: u64,
}

pub fn parse_network(network_str: &str) -> Result<BitcoinNetwork, AppError> {
    match network_str.to_lowercase().as_str() {
        "bitcoin" | "mainnet" => Ok(BitcoinNetwork::Bitcoin),
        "testnet" => Ok(BitcoinNetwork::Testnet),
        s => Err(AppError::InputValidation(format!("無効なネットワークが指定されました: {}", s))),
    }
}

pub fn network_name(network: BitcoinNetwork) -> &'static str {
    match network {
        BitcoinNetwork::Bitcoin => "bitcoin",
        BitcoinNetwork::Testnet => "testnet",
        BitcoinNetwork::Signet => "signet",
        BitcoinNetwork::Regtest => "regtest",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_rate_precedence_ignores_lower_priority_options() {
        assert_eq!(
            FeeSpec::from_options(Some(7), Some(2.5), QuoteSource::Slipstream),
            FeeSpec::ExplicitRate(7)
        );
        assert_eq!(
            FeeSpec::from_options(None, Some(2.5), QuoteSource::Slipstream),
            FeeSpec::ExplicitUsd(2.5)
        );
        assert_eq!(
            FeeSpec::from_options(None, None, QuoteSource::Slipstream),
            FeeSpec::AutoFetch(QuoteSource::Slipstream)
        );
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(FeeRate::new(0), Err(AppError::NonPositiveFee(0))));
        assert!(matches!(FeeRate::from_quote(-3.0), Err(AppError::NonPositiveFee(-3))));
        assert!(matches!(FeeRate::from_quote(f64::NAN), Err(AppError::NonPositiveFee(_))));
    }

    #[test]
    fn fractional_quotes_round_up() {
        assert_eq!(FeeRate::from_quote(3.2).unwrap().sat_per_vb(), 4);
        assert_eq!(FeeRate::from_quote(5.0).unwrap().sat_per_vb(), 5);
    }

    #[test]
    fn script_type_serializes_with_stable_names() {
        let json = serde_json::to_string(&ScriptType::ALL).unwrap();
        assert_eq!(json, r#"["legacy","p2sh-segwit","segwit","taproot"]"#);
    }

    #[test]
    fn only_bitcoin_and_testnet_are_accepted() {
        assert_eq!(parse_network("mainnet").unwrap(), BitcoinNetwork::Bitcoin);
        assert_eq!(parse_network("Testnet").unwrap(), BitcoinNetwork::Testnet);
        assert!(parse_network("regtest").is_err());
    }
}
