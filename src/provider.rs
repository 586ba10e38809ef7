//! 外部サービスとの境界。エンジンはこれらのトレイト越しにのみ外部データを受け取る。

use bitcoin::{Address, Network as BitcoinNetwork};

use crate::{
    error::AppError,
    types::{QuoteSource, Utxo},
};

pub trait UtxoProvider {
    fn get_utxos(&self, address: &Address, network: BitcoinNetwork) -> Result<Vec<Utxo>, AppError>;

    fn get_balance(&self, address: &Address, network: BitcoinNetwork) -> Result<u64, AppError>;
}

pub trait FeeQuoteProvider {
    /// 推奨手数料率 (sats/vB)。小数の場合もある
    fn get_recommended_rate(&self, source: QuoteSource, network: BitcoinNetwork) -> Result<f64, AppError>;
}

pub trait PriceProvider {
    fn get_btc_usd_price(&self) -> Result<f64, AppError>;
}
