use bitcoin::Network as BitcoinNetwork;

use crate::{
    error::AppError,
    provider::{FeeQuoteProvider, PriceProvider},
    types::{FeeRate, FeeSpec},
};

const SATS_PER_BTC: f64 = 100_000_000.0;

/// 見積もりvsizeに対する手数料 (sats) を返す
pub trait FeePolicy {
    fn fee_for_vsize(&self, vsize: u64) -> Result<u64, AppError>;
}

/// 外部呼び出しを済ませた後の手数料指定。
///
/// `prepare` で価格・見積もりの取得を一度だけ行い、以降は `rate_for` で
/// 任意のvsizeに対する手数料率を外部I/Oなしで求められる。
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedFee {
    Rate(FeeRate),
    UsdBudget {
        fee_usd: f64,
        btc_usd_price: f64,
        budget_sats: u64,
    },
}

impl ResolvedFee {
    pub fn rate_for(&self, estimated_vsize: u64) -> Result<FeeRate, AppError> {
        match self {
            ResolvedFee::Rate(rate) => Ok(*rate),
            ResolvedFee::UsdBudget { budget_sats, .. } => {
                if estimated_vsize == 0 {
                    return Err(AppError::Internal("vsizeが0です".to_string()));
                }
                FeeRate::new(budget_sats.div_ceil(estimated_vsize))
            }
        }
    }

    /// 既に取得済みのBTC/USD価格 (USD指定の場合のみ)
    pub fn btc_usd_price(&self) -> Option<f64> {
        match self {
            ResolvedFee::Rate(_) => None,
            ResolvedFee::UsdBudget { btc_usd_price, .. } => Some(*btc_usd_price),
        }
    }
}

impl FeePolicy for ResolvedFee {
    fn fee_for_vsize(&self, vsize: u64) -> Result<u64, AppError> {
        Ok(self.rate_for(vsize)?.fee_for_vsize(vsize))
    }
}

pub fn prepare(
    spec: &FeeSpec,
    network: BitcoinNetwork,
    quotes: &dyn FeeQuoteProvider,
    prices: &dyn PriceProvider,
) -> Result<ResolvedFee, AppError> {
    match spec {
        FeeSpec::ExplicitRate(rate) => {
            log::info!("明示的な手数料率を使用します: {} sats/vB", rate);
            Ok(ResolvedFee::Rate(FeeRate::new(*rate)?))
        }
        FeeSpec::ExplicitUsd(fee_usd) => {
            if !fee_usd.is_finite() || *fee_usd <= 0.0 {
                return Err(AppError::NonPositiveFee(fee_usd.floor() as i64));
            }
            let btc_usd_price = prices.get_btc_usd_price()?;
            if !btc_usd_price.is_finite() || btc_usd_price <= 0.0 {
                return Err(AppError::PriceUnavailable(format!("不正な価格です: {}", btc_usd_price)));
            }
            let budget_sats = usd_to_sats(*fee_usd, btc_usd_price);
            log::info!(
                "USD指定の手数料: ${} (BTC/USD {}) => {} sats",
                fee_usd, btc_usd_price, budget_sats
            );
            if budget_sats == 0 {
                return Err(AppError::NonPositiveFee(0));
            }
            Ok(ResolvedFee::UsdBudget {
                fee_usd: *fee_usd,
                btc_usd_price,
                budget_sats,
            })
        }
        FeeSpec::AutoFetch(source) => {
            let quoted = quotes.get_recommended_rate(*source, network)?;
            let rate = FeeRate::from_quote(quoted)?;
            log::info!("{} から取得した手数料率: {} (元の値 {})", source.as_str(), rate, quoted);
            Ok(ResolvedFee::Rate(rate))
        }
    }
}

pub fn resolve(
    spec: &FeeSpec,
    estimated_vsize: u64,
    network: BitcoinNetwork,
    quotes: &dyn FeeQuoteProvider,
    prices: &dyn PriceProvider,
) -> Result<FeeRate, AppError> {
    prepare(spec, network, quotes, prices)?.rate_for(estimated_vsize)
}

pub fn usd_to_sats(usd: f64, btc_usd_price: f64) -> u64 {
    (usd * SATS_PER_BTC / btc_usd_price).floor() as u64
}

pub fn sats_to_usd(sats: u64, btc_usd_price: f64) -> f64 {
    (sats as f64 / SATS_PER_BTC) * btc_usd_price
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::types::QuoteSource;

    struct FixedQuote {
        rate: Result<f64, ()>,
        calls: Cell<usize>,
    }

    impl FeeQuoteProvider for FixedQuote {
        fn get_recommended_rate(&self, source: QuoteSource, _network: BitcoinNetwork) -> Result<f64, AppError> {
            self.calls.set(self.calls.get() + 1);
            self.rate.map_err(|_| AppError::QuoteUnavailable {
                source_name: source.as_str().to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    struct FixedPrice(Result<f64, ()>);

    impl PriceProvider for FixedPrice {
        fn get_btc_usd_price(&self) -> Result<f64, AppError> {
            self.0.map_err(|_| AppError::PriceUnavailable("timeout".to_string()))
        }
    }

    fn quote(rate: f64) -> FixedQuote {
        FixedQuote { rate: Ok(rate), calls: Cell::new(0) }
    }

    #[test]
    fn explicit_rate_is_returned_unchanged() {
        let rate = resolve(&FeeSpec::ExplicitRate(1), 250, BitcoinNetwork::Bitcoin, &quote(50.0), &FixedPrice(Err(())))
            .unwrap();
        assert_eq!(rate.sat_per_vb(), 1);
    }

    #[test]
    fn explicit_rate_never_touches_providers() {
        let quotes = quote(50.0);
        prepare(&FeeSpec::ExplicitRate(3), BitcoinNetwork::Bitcoin, &quotes, &FixedPrice(Err(()))).unwrap();
        assert_eq!(quotes.calls.get(), 0);
    }

    #[test]
    fn usd_fee_is_spread_over_vsize_rounding_up() {
        // $1 at $50,000/BTC = 2,000 sats; 2000 / 141 = 14.18 -> 15
        let rate = resolve(
            &FeeSpec::ExplicitUsd(1.0),
            141,
            BitcoinNetwork::Bitcoin,
            &quote(50.0),
            &FixedPrice(Ok(50_000.0)),
        )
        .unwrap();
        assert_eq!(rate.sat_per_vb(), 15);
    }

    #[test]
    fn usd_fee_fails_without_price() {
        let err = resolve(&FeeSpec::ExplicitUsd(1.0), 141, BitcoinNetwork::Bitcoin, &quote(5.0), &FixedPrice(Err(())))
            .unwrap_err();
        assert!(matches!(err, AppError::PriceUnavailable(_)));
    }

    #[test]
    fn dust_sized_usd_fee_is_non_positive() {
        let err = prepare(
            &FeeSpec::ExplicitUsd(0.000001),
            BitcoinNetwork::Bitcoin,
            &quote(5.0),
            &FixedPrice(Ok(50_000.0)),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::NonPositiveFee(0)));

        let err = prepare(&FeeSpec::ExplicitUsd(-2.0), BitcoinNetwork::Bitcoin, &quote(5.0), &FixedPrice(Ok(50_000.0)))
            .unwrap_err();
        assert!(matches!(err, AppError::NonPositiveFee(-2)));
    }

    #[test]
    fn auto_fetch_uses_the_quote_once_per_prepare() {
        let quotes = quote(12.4);
        let resolved = prepare(
            &FeeSpec::AutoFetch(QuoteSource::Mempool),
            BitcoinNetwork::Bitcoin,
            &quotes,
            &FixedPrice(Err(())),
        )
        .unwrap();
        for vsize in [110, 141, 200] {
            assert_eq!(resolved.rate_for(vsize).unwrap().sat_per_vb(), 13);
        }
        assert_eq!(quotes.calls.get(), 1);
    }

    #[test]
    fn auto_fetch_failure_is_not_replaced_by_a_default() {
        let quotes = FixedQuote { rate: Err(()), calls: Cell::new(0) };
        let err = prepare(
            &FeeSpec::AutoFetch(QuoteSource::Slipstream),
            BitcoinNetwork::Bitcoin,
            &quotes,
            &FixedPrice(Ok(1.0)),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::QuoteUnavailable { .. }));
    }

    #[test]
    fn zero_quote_is_non_positive() {
        let err = prepare(
            &FeeSpec::AutoFetch(QuoteSource::Mempool),
            BitcoinNetwork::Bitcoin,
            &quote(0.0),
            &FixedPrice(Err(())),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::NonPositiveFee(0)));
    }

    #[test]
    fn usd_budget_fee_covers_the_budget() {
        let resolved = ResolvedFee::UsdBudget { fee_usd: 1.0, btc_usd_price: 50_000.0, budget_sats: 2_000 };
        let fee = resolved.fee_for_vsize(141).unwrap();
        assert_eq!(fee, 15 * 141);
        assert!(fee >= 2_000);
    }
}
