use bitcoin::{
    Address, Amount, Network as BitcoinNetwork, PrivateKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
    absolute::LockTime,
    consensus::encode,
    secp256k1::{All, Secp256k1},
    transaction::Version,
};

use crate::{
    error::AppError,
    planner::Plan,
    record::ReconstructionRecord,
    signer::{SignableInput, sign_transaction},
    types::Utxo,
};

/// `assemble` の2つの終端状態
#[derive(Debug, Clone)]
pub enum Assembled {
    Signed(Transaction),
    Unsigned {
        transaction: Transaction,
        record: ReconstructionRecord,
    },
}

impl Assembled {
    pub fn transaction(&self) -> &Transaction {
        match self {
            Assembled::Signed(transaction) => transaction,
            Assembled::Unsigned { transaction, .. } => transaction,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Assembled::Signed(_))
    }

    pub fn to_hex(&self) -> String {
        encode::serialize_hex(self.transaction())
    }
}

/// 署名前のトランザクション (script_sig と witness は空)。
/// オフライン署名でも同じ関数で再構築するため、入出力の順序はそのまま保つ。
pub fn build_unsigned_transaction(inputs: &[Utxo], outputs: &[TxOut]) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|utxo| TxIn {
                previous_output: utxo.out_point(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs.to_vec(),
    }
}

pub fn assemble(
    plan: &Plan,
    source: &Address,
    network: BitcoinNetwork,
    signer: Option<&PrivateKey>,
    secp: &Secp256k1<All>,
) -> Result<Assembled, AppError> {
    let outputs: Vec<TxOut> = plan
        .outputs
        .iter()
        .map(|o| TxOut {
            value: Amount::from_sat(o.amount_sats),
            script_pubkey: o.address.script_pubkey(),
        })
        .collect();
    let unsigned = build_unsigned_transaction(&plan.selected, &outputs);
    log::info!(
        "トランザクションを構築しました。入力 {} 件, 出力 {} 件, 手数料 {} sats",
        unsigned.input.len(),
        unsigned.output.len(),
        plan.fee_sats
    );

    match signer {
        Some(private_key) => {
            let source_script = source.script_pubkey();
            let inputs: Vec<SignableInput> = plan
                .selected
                .iter()
                .map(|utxo| SignableInput {
                    prevout: TxOut {
                        value: utxo.amount(),
                        script_pubkey: source_script.clone(),
                    },
                    script_type: utxo.script_type,
                })
                .collect();
            let signed = sign_transaction(&unsigned, &inputs, private_key, secp)?;
            Ok(Assembled::Signed(signed))
        }
        None => {
            log::info!("秘密鍵が指定されていないため未署名トランザクションとunsigned_dataを作成します。");
            let record = ReconstructionRecord::from_plan(plan, source, network);
            Ok(Assembled::Unsigned {
                transaction: unsigned,
                record,
            })
        }
    }
}
