use bitcoin::{
    Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
    absolute::LockTime, script::Builder, transaction::Version,
};

use crate::{
    error::AppError,
    fee::FeePolicy,
    types::{Output, ScriptType, SpendPlan, Utxo},
};

// トランザクションサイズの推定に使用するダミーデータ
const DUMMY_SIGNATURE_LEN: usize = 72;
const DUMMY_PUBKEY_LEN: usize = 33;
const UNCOMPRESSED_PUBKEY_LEN: usize = 65;
const P2WPKH_REDEEM_SCRIPT_LEN: usize = 22;
const SCHNORR_SIGNATURE_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub selected: Vec<Utxo>,
    pub outputs: Vec<Output>,
    pub fee_sats: u64,
    pub vsize: u64,
}

impl Plan {
    pub fn total_input_sats(&self) -> u64 {
        self.selected.iter().map(|u| u.amount_sats).sum()
    }

    pub fn total_output_sats(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount_sats).sum()
    }

    pub fn send_sats(&self) -> u64 {
        self.outputs.first().map_or(0, |o| o.amount_sats)
    }

    pub fn change_sats(&self) -> u64 {
        self.outputs.get(1).map_or(0, |o| o.amount_sats)
    }
}

/// 署名後と同じ長さになるようダミーの scriptSig / witness を詰めた入力
fn placeholder_input(script_type: ScriptType, compressed_key: bool) -> TxIn {
    let mut tx_in = TxIn {
        previous_output: OutPoint::null(),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::new(),
    };
    match script_type {
        ScriptType::Legacy => {
            let builder = Builder::new().push_slice([0u8; DUMMY_SIGNATURE_LEN]);
            // 非圧縮鍵は scriptSig に65バイトの公開鍵を積む
            tx_in.script_sig = if compressed_key {
                builder.push_slice([0u8; DUMMY_PUBKEY_LEN]).into_script()
            } else {
                builder.push_slice([0u8; UNCOMPRESSED_PUBKEY_LEN]).into_script()
            };
        }
        ScriptType::P2shSegwit => {
            tx_in.script_sig = Builder::new()
                .push_slice([0u8; P2WPKH_REDEEM_SCRIPT_LEN])
                .into_script();
            tx_in.witness.push([0u8; DUMMY_SIGNATURE_LEN]);
            tx_in.witness.push([0u8; DUMMY_PUBKEY_LEN]);
        }
        ScriptType::Segwit => {
            tx_in.witness.push([0u8; DUMMY_SIGNATURE_LEN]);
            tx_in.witness.push([0u8; DUMMY_PUBKEY_LEN]);
        }
        ScriptType::Taproot => {
            tx_in.witness.push([0u8; SCHNORR_SIGNATURE_LEN]);
        }
    }
    tx_in
}

/// 圧縮公開鍵を前提としたvsize見積もり
pub fn estimate_vsize(script_type: ScriptType, input_count: usize, output_scripts: &[ScriptBuf]) -> u64 {
    estimate_vsize_for_key(script_type, true, input_count, output_scripts)
}

pub fn estimate_vsize_for_key(
    script_type: ScriptType,
    compressed_key: bool,
    input_count: usize,
    output_scripts: &[ScriptBuf],
) -> u64 {
    let temp_tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: (0..input_count).map(|_| placeholder_input(script_type, compressed_key)).collect(),
        output: output_scripts
            .iter()
            .map(|script_pubkey| TxOut {
                value: Amount::ZERO,
                script_pubkey: script_pubkey.clone(),
            })
            .collect(),
    };
    temp_tx.vsize() as u64
}

pub struct Planner {
    source: Address,
    target: Address,
    script_type: ScriptType,
    dust_threshold_sats: u64,
    compressed_key: bool,
}

impl Planner {
    pub fn new(source: Address, target: Address, script_type: ScriptType, dust_threshold_sats: u64) -> Self {
        Planner {
            source,
            target,
            script_type,
            dust_threshold_sats,
            compressed_key: true,
        }
    }

    /// 署名鍵が分かっている場合はその圧縮形式でサイズを見積もる。
    /// アドレスのみの実行では鍵の形式が分からないので圧縮鍵とみなす。
    pub fn with_compressed_key(mut self, compressed_key: bool) -> Self {
        self.compressed_key = compressed_key;
        self
    }

    /// 選択するUTXOの先頭集合を1つずつ広げ、各候補で「おつりあり」「おつりなし」の順に
    /// vsizeと手数料を求めて充足を判定する。vsizeは入力数に対して単調増加なので
    /// ループは高々 `utxos.len()` 回で終わる。
    pub fn plan(&self, utxos: &[Utxo], spend: SpendPlan, fee: &dyn FeePolicy) -> Result<Plan, AppError> {
        if let Some(other) = utxos.iter().find(|u| u.script_type != self.script_type) {
            return Err(AppError::InputValidation(format!(
                "UTXO {}:{} のスクリプト種別 {} が送金元 {} と一致しません",
                other.txid, other.vout, other.script_type, self.script_type
            )));
        }
        log::info!(
            "UTXO選択を開始します。候補 {} 件, 種別 {}, 方針 {:?}",
            utxos.len(),
            self.script_type,
            spend
        );

        let plan = match spend {
            SpendPlan::SendAll => self.plan_send_all(utxos, fee)?,
            SpendPlan::SendAmount(amount) => self.plan_send_amount(utxos, amount, fee)?,
        };

        debug_assert_eq!(plan.total_input_sats(), plan.total_output_sats() + plan.fee_sats);
        log::info!(
            "選択完了: 入力 {} 件, 出力 {} 件, 手数料 {} sats, vsize {} vB",
            plan.selected.len(),
            plan.outputs.len(),
            plan.fee_sats,
            plan.vsize
        );
        Ok(plan)
    }

    fn plan_send_all(&self, utxos: &[Utxo], fee: &dyn FeePolicy) -> Result<Plan, AppError> {
        let total = sum_amounts(utxos)?;
        let vsize = self.vsize_for(utxos.len(), false);
        let fee_sats = fee.fee_for_vsize(vsize)?;
        log::debug!("全額送金: 入力合計 {} sats, vsize {} vB, 手数料 {} sats", total, vsize, fee_sats);

        let send_sats = total
            .checked_sub(fee_sats)
            .filter(|amount| *amount > 0 && *amount >= self.dust_threshold_sats)
            .ok_or(AppError::InsufficientFunds {
                available: total,
                required: fee_sats.saturating_add(self.dust_threshold_sats),
                fee: fee_sats,
            })?;

        Ok(Plan {
            selected: utxos.to_vec(),
            outputs: vec![self.target_output(send_sats)],
            fee_sats,
            vsize,
        })
    }

    fn plan_send_amount(&self, utxos: &[Utxo], amount: u64, fee: &dyn FeePolicy) -> Result<Plan, AppError> {
        if amount == 0 || amount < self.dust_threshold_sats {
            return Err(AppError::InputValidation(format!(
                "送金額 {} sats がダスト閾値 {} sats 未満です",
                amount, self.dust_threshold_sats
            )));
        }

        let mut total: u64 = 0;
        let mut shortfall = (amount, 0);
        for (index, utxo) in utxos.iter().enumerate() {
            let count = index + 1;
            total = total
                .checked_add(utxo.amount_sats)
                .ok_or_else(|| AppError::InputValidation("UTXO合計がオーバーフローしました".to_string()))?;

            let with_change_vsize = self.vsize_for(count, true);
            let with_change_fee = fee.fee_for_vsize(with_change_vsize)?;
            let change = total.checked_sub(amount.saturating_add(with_change_fee));
            log::debug!(
                "候補 {} 件: 入力合計 {} sats, おつりありvsize {} vB, 手数料 {} sats, おつり {:?}",
                count,
                total,
                with_change_vsize,
                with_change_fee,
                change
            );

            // 閾値0の設定でも0 satsのおつり出力は作らない
            if let Some(change) = change.filter(|c| *c > 0 && *c >= self.dust_threshold_sats) {
                return Ok(Plan {
                    selected: utxos[..count].to_vec(),
                    outputs: vec![self.target_output(amount), self.change_output(change)],
                    fee_sats: with_change_fee,
                    vsize: with_change_vsize,
                });
            }

            // おつりを出せないなら1出力にして差額を手数料に含める
            let single_vsize = self.vsize_for(count, false);
            let single_fee = fee.fee_for_vsize(single_vsize)?;
            let required = amount.saturating_add(single_fee);
            if total >= required {
                let folded_fee = total - amount;
                log::warn!(
                    "おつり {} sats はダスト閾値 {} sats 未満のため手数料に含めます。",
                    folded_fee - single_fee,
                    self.dust_threshold_sats
                );
                return Ok(Plan {
                    selected: utxos[..count].to_vec(),
                    outputs: vec![self.target_output(amount)],
                    fee_sats: folded_fee,
                    vsize: single_vsize,
                });
            }
            shortfall = (required, single_fee);
        }

        let (required, fee_sats) = shortfall;
        Err(AppError::InsufficientFunds {
            available: total,
            required,
            fee: fee_sats,
        })
    }

    fn vsize_for(&self, input_count: usize, with_change: bool) -> u64 {
        let mut scripts = vec![self.target.script_pubkey()];
        if with_change {
            scripts.push(self.source.script_pubkey());
        }
        estimate_vsize_for_key(self.script_type, self.compressed_key, input_count, &scripts)
    }

    fn target_output(&self, amount_sats: u64) -> Output {
        Output {
            address: self.target.clone(),
            amount_sats,
        }
    }

    fn change_output(&self, amount_sats: u64) -> Output {
        Output {
            address: self.source.clone(),
            amount_sats,
        }
    }
}

fn sum_amounts(utxos: &[Utxo]) -> Result<u64, AppError> {
    utxos.iter().try_fold(0u64, |acc, u| {
        acc.checked_add(u.amount_sats)
            .ok_or_else(|| AppError::InputValidation("UTXO合計がオーバーフローしました".to_string()))
    })
}
