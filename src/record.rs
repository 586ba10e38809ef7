use std::collections::HashSet;
use std::str::FromStr;

use bitcoin::{Address, Amount, Network as BitcoinNetwork, TxOut, Txid};
use serde::{Deserialize, Serialize};

use crate::{
    classify::{classify_address, parse_address},
    error::AppError,
    planner::Plan,
    types::{ScriptType, Utxo, network_name, parse_network},
};

/// オフライン署名者が入力を再構築するための情報 (`unsigned_data.json`)。
///
/// 生のトランザクションhexには各入力の金額とスクリプト種別が含まれないため、
/// それらをここに保持する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionRecord {
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    pub fee_satoshis: u64,
    pub inputs: Vec<RecordInput>,
    pub outputs: Vec<RecordOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInput {
    pub txid: String,
    pub vout: u32,
    pub amount_satoshis: u64,
    pub script_type: ScriptType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutput {
    pub address: String,
    pub amount_satoshis: u64,
}

/// 検証済みのレコード
#[derive(Debug, Clone)]
pub struct ValidatedRecord {
    pub network: BitcoinNetwork,
    pub source: Option<Address>,
    pub script_type: ScriptType,
    pub inputs: Vec<Utxo>,
    pub outputs: Vec<TxOut>,
    pub fee_sats: u64,
}

fn malformed(reason: impl Into<String>) -> AppError {
    AppError::MalformedRecord(reason.into())
}

impl ReconstructionRecord {
    pub fn from_plan(plan: &Plan, source: &Address, network: BitcoinNetwork) -> Self {
        ReconstructionRecord {
            network: network_name(network).to_string(),
            source_address: Some(source.to_string()),
            fee_satoshis: plan.fee_sats,
            inputs: plan
                .selected
                .iter()
                .map(|u| RecordInput {
                    txid: u.txid.to_string(),
                    vout: u.vout,
                    amount_satoshis: u.amount_sats,
                    script_type: u.script_type,
                })
                .collect(),
            outputs: plan
                .outputs
                .iter()
                .map(|o| RecordOutput {
                    address: o.address.to_string(),
                    amount_satoshis: o.amount_sats,
                })
                .collect(),
        }
    }

    pub fn from_json(content: &str) -> Result<Self, AppError> {
        serde_json::from_str(content).map_err(|e| malformed(format!("JSONの解析に失敗しました: {}", e)))
    }

    pub fn to_json_pretty(&self) -> Result<String, AppError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Internal(format!("unsigned_dataのシリアライズに失敗: {}", e)))
    }

    pub fn validate(&self) -> Result<ValidatedRecord, AppError> {
        let network = parse_network(&self.network).map_err(|_| malformed(format!("不明なネットワーク: {}", self.network)))?;

        let first = self.inputs.first().ok_or_else(|| malformed("入力がありません"))?;
        if self.outputs.is_empty() {
            return Err(malformed("出力がありません"));
        }
        let script_type = first.script_type;

        let mut seen = HashSet::new();
        let mut inputs = Vec::with_capacity(self.inputs.len());
        for (index, input) in self.inputs.iter().enumerate() {
            if input.script_type != script_type {
                return Err(malformed(format!(
                    "入力 {} のスクリプト種別 {} が他の入力 ({}) と異なります",
                    index, input.script_type, script_type
                )));
            }
            let txid = Txid::from_str(&input.txid)
                .map_err(|e| malformed(format!("入力 {} のTXIDが不正です ({}): {}", index, input.txid, e)))?;
            if !seen.insert((txid, input.vout)) {
                return Err(malformed(format!("入力 {}:{} が重複しています", input.txid, input.vout)));
            }
            inputs.push(Utxo {
                txid,
                vout: input.vout,
                amount_sats: input.amount_satoshis,
                script_type: input.script_type,
            });
        }

        let mut outputs = Vec::with_capacity(self.outputs.len());
        for output in &self.outputs {
            if output.amount_satoshis == 0 {
                return Err(malformed(format!("出力 {} の金額が0です", output.address)));
            }
            let address = parse_address(&output.address, network).map_err(|e| malformed(e.to_string()))?;
            outputs.push(TxOut {
                value: Amount::from_sat(output.amount_satoshis),
                script_pubkey: address.script_pubkey(),
            });
        }

        let total_in = checked_sum(self.inputs.iter().map(|i| i.amount_satoshis))?;
        let total_out = checked_sum(self.outputs.iter().map(|o| o.amount_satoshis))?;
        if total_out.checked_add(self.fee_satoshis) != Some(total_in) {
            return Err(malformed(format!(
                "金額が一致しません: 入力 {} sats != 出力 {} sats + 手数料 {} sats",
                total_in, total_out, self.fee_satoshis
            )));
        }

        let source = match &self.source_address {
            Some(source) => {
                let address = parse_address(source, network).map_err(|e| malformed(e.to_string()))?;
                let source_type = classify_address(&address).map_err(|e| malformed(e.to_string()))?;
                if source_type != script_type {
                    return Err(malformed(format!(
                        "送金元アドレスの種別 {} が入力の種別 {} と一致しません",
                        source_type, script_type
                    )));
                }
                Some(address)
            }
            None => None,
        };

        Ok(ValidatedRecord {
            network,
            source,
            script_type,
            inputs,
            outputs,
            fee_sats: self.fee_satoshis,
        })
    }
}

fn checked_sum(mut values: impl Iterator<Item = u64>) -> Result<u64, AppError> {
    values
        .try_fold(0u64, |acc, v| acc.checked_add(v))
        .ok_or_else(|| malformed("金額の合計がオーバーフローしました"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";
    const TARGET: &str = "tb1psmsr8rc6jwl47xsv4zahnt39m2peexxhxrfvprqpw86yf55rkzgq70ycww";

    fn record() -> ReconstructionRecord {
        ReconstructionRecord {
            network: "testnet".to_string(),
            source_address: Some(SOURCE.to_string()),
            fee_satoshis: 1_000,
            inputs: vec![RecordInput {
                txid: "ab".repeat(32),
                vout: 1,
                amount_satoshis: 100_000,
                script_type: ScriptType::Segwit,
            }],
            outputs: vec![
                RecordOutput { address: TARGET.to_string(), amount_satoshis: 50_000 },
                RecordOutput { address: SOURCE.to_string(), amount_satoshis: 49_000 },
            ],
        }
    }

    #[test]
    fn json_field_names_are_stable() {
        let value: serde_json::Value = serde_json::from_str(&record().to_json_pretty().unwrap()).unwrap();
        assert_eq!(value["network"], "testnet");
        assert_eq!(value["fee_satoshis"], 1_000);
        assert_eq!(value["inputs"][0]["txid"], "ab".repeat(32));
        assert_eq!(value["inputs"][0]["vout"], 1);
        assert_eq!(value["inputs"][0]["amount_satoshis"], 100_000);
        assert_eq!(value["inputs"][0]["script_type"], "segwit");
        assert_eq!(value["outputs"][1]["address"], SOURCE);
        assert_eq!(value["outputs"][1]["amount_satoshis"], 49_000);
    }

    #[test]
    fn minimal_schema_without_source_is_accepted() {
        let json = format!(
            r#"{{"network":"testnet","fee_satoshis":500,
                "inputs":[{{"txid":"{}","vout":0,"amount_satoshis":10500,"script_type":"segwit"}}],
                "outputs":[{{"address":"{}","amount_satoshis":10000}}]}}"#,
            "cd".repeat(32),
            TARGET
        );
        let validated = ReconstructionRecord::from_json(&json).unwrap().validate().unwrap();
        assert!(validated.source.is_none());
        assert_eq!(validated.script_type, ScriptType::Segwit);
        assert_eq!(validated.fee_sats, 500);
    }

    #[test]
    fn valid_record_passes() {
        let validated = record().validate().unwrap();
        assert_eq!(validated.network, BitcoinNetwork::Testnet);
        assert_eq!(validated.inputs.len(), 1);
        assert_eq!(validated.outputs.len(), 2);
    }

    #[test]
    fn unbalanced_amounts_are_malformed() {
        let mut r = record();
        r.fee_satoshis = 999;
        assert!(matches!(r.validate(), Err(AppError::MalformedRecord(_))));
    }

    #[test]
    fn structural_problems_are_malformed() {
        let mut no_inputs = record();
        no_inputs.inputs.clear();

        let mut bad_txid = record();
        bad_txid.inputs[0].txid = "zz".to_string();

        let mut duplicate = record();
        duplicate.inputs.push(duplicate.inputs[0].clone());
        duplicate.fee_satoshis += 100_000;

        let mut mixed = record();
        mixed.inputs.push(RecordInput {
            txid: "01".repeat(32),
            vout: 0,
            amount_satoshis: 1_000,
            script_type: ScriptType::Taproot,
        });
        mixed.fee_satoshis += 1_000;

        let mut wrong_network = record();
        wrong_network.network = "bitcoin".to_string();

        let mut wrong_source = record();
        wrong_source.source_address = Some(TARGET.to_string());

        for r in [no_inputs, bad_txid, duplicate, mixed, wrong_network, wrong_source] {
            assert!(matches!(r.validate(), Err(AppError::MalformedRecord(_))), "{r:?}");
        }
    }

    #[test]
    fn overflowing_amounts_are_malformed() {
        let mut r = record();
        r.outputs[0].amount_satoshis = u64::MAX;
        assert!(matches!(r.validate(), Err(AppError::MalformedRecord(_))));

        let mut zero = record();
        zero.outputs[1].amount_satoshis = 0;
        zero.fee_satoshis = 50_000;
        assert!(matches!(zero.validate(), Err(AppError::MalformedRecord(_))));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            ReconstructionRecord::from_json(r#"{"network":"testnet"}"#),
            Err(AppError::MalformedRecord(_))
        ));
    }
}
