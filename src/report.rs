use std::fmt::Write;

use bitcoin::{Address, Network as BitcoinNetwork};

use crate::{
    engine::SendOutcome,
    fee::sats_to_usd,
    provider::PriceProvider,
};

const SATS_PER_BTC: f64 = 100_000_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDetails {
    pub source_address: String,
    pub target_address: String,
    pub source_explorer_url: String,
    pub target_explorer_url: String,
    pub total_balance_sats: u64,
    pub send_sats: u64,
    pub change_sats: u64,
    pub estimated_vsize: u64,
    pub fee_rate: f64,
    pub fee_sats: u64,
    pub fee_usd: Option<f64>,
    pub signed: bool,
    pub tx_hex: String,
}

pub fn explorer_url(address: &Address, network: BitcoinNetwork) -> String {
    match network {
        BitcoinNetwork::Bitcoin => format!("https://www.blockchain.com/btc/address/{}", address),
        _ => format!("https://www.blockchain.com/btc-testnet/address/{}", address),
    }
}

impl TransactionDetails {
    /// USD換算は表示用のみ。価格が取れなければ省略する
    pub fn from_outcome(outcome: &SendOutcome, prices: &dyn PriceProvider) -> Self {
        let fee_sats = outcome.plan.fee_sats;
        let price = match outcome.resolved_fee.btc_usd_price() {
            Some(price) => Some(price),
            None => prices
                .get_btc_usd_price()
                .inspect_err(|e| log::warn!("手数料のUSD換算を省略します: {}", e))
                .ok(),
        };

        TransactionDetails {
            source_address: outcome.source_address.to_string(),
            target_address: outcome.target_address.to_string(),
            source_explorer_url: explorer_url(&outcome.source_address, outcome.network),
            target_explorer_url: explorer_url(&outcome.target_address, outcome.network),
            total_balance_sats: outcome.total_balance_sats,
            send_sats: outcome.plan.send_sats(),
            change_sats: outcome.plan.change_sats(),
            estimated_vsize: outcome.plan.vsize,
            fee_rate: fee_sats as f64 / outcome.plan.vsize.max(1) as f64,
            fee_sats,
            fee_usd: price.map(|p| sats_to_usd(fee_sats, p)),
            signed: outcome.assembled.is_signed(),
            tx_hex: outcome.assembled.to_hex(),
        }
    }

    pub fn render(&self) -> String {
        let btc = |sats: u64| sats as f64 / SATS_PER_BTC;
        let mut out = String::new();
        let _ = writeln!(out, "=== トランザクション詳細 ===");
        let _ = writeln!(out, "送金元アドレス        : {}", self.source_address);
        let _ = writeln!(out, "エクスプローラ (送金元): {}", self.source_explorer_url);
        let _ = writeln!(out, "送金先アドレス        : {}", self.target_address);
        let _ = writeln!(out, "エクスプローラ (送金先): {}", self.target_explorer_url);
        let _ = writeln!(out, "残高合計              : {:.8} BTC", btc(self.total_balance_sats));
        let _ = writeln!(out, "送金額                : {} sats ({:.8} BTC)", self.send_sats, btc(self.send_sats));
        if self.change_sats > 0 {
            let _ = writeln!(out, "おつり                : {} sats ({:.8} BTC)", self.change_sats, btc(self.change_sats));
        }
        let _ = writeln!(out, "推定サイズ            : {} vB", self.estimated_vsize);
        let _ = writeln!(out, "手数料率              : {:.2} sats/vB", self.fee_rate);
        match self.fee_usd {
            Some(usd) => {
                let _ = writeln!(out, "手数料                : {} sats (~${:.2})", self.fee_sats, usd);
            }
            None => {
                let _ = writeln!(out, "手数料                : {} sats", self.fee_sats);
            }
        }
        let label = if self.signed { "署名済み" } else { "未署名" };
        let _ = writeln!(out, "\nRaw Transaction Hex ({}):", label);
        let _ = writeln!(out, "{}", self.tx_hex);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> TransactionDetails {
        TransactionDetails {
            source_address: "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa".to_string(),
            target_address: "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4".to_string(),
            source_explorer_url: "https://www.blockchain.com/btc/address/1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa".to_string(),
            target_explorer_url: "https://www.blockchain.com/btc/address/bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
                .to_string(),
            total_balance_sats: 100_000,
            send_sats: 50_000,
            change_sats: 0,
            estimated_vsize: 200,
            fee_rate: 5.0,
            fee_sats: 1_000,
            fee_usd: Some(0.5),
            signed: false,
            tx_hex: "0200".to_string(),
        }
    }

    #[test]
    fn render_lists_amounts_and_hex() {
        let text = details().render();
        assert!(text.contains("50000 sats (0.00050000 BTC)"));
        assert!(text.contains("1000 sats (~$0.50)"));
        assert!(text.contains("未署名"));
        assert!(text.trim_end().ends_with("0200"));
        assert!(!text.contains("おつり"));
    }

    #[test]
    fn change_line_appears_only_with_change() {
        let mut d = details();
        d.change_sats = 49_000;
        d.fee_usd = None;
        let text = d.render();
        assert!(text.contains("おつり"));
        assert!(text.contains("手数料                : 1000 sats\n"));
    }
}
