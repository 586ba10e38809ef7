use bitcoin::{
    PrivateKey, ScriptBuf, Transaction, TxOut, Witness, consensus::encode, ecdsa,
    hashes::Hash,
    key::TapTweak,
    script::{Builder, PushBytesBuf},
    secp256k1::{All, Keypair, Message, Secp256k1},
    sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType},
    taproot,
};

use crate::{
    assembler::build_unsigned_transaction,
    error::AppError,
    keys::{p2wpkh_script, source_script_pubkey},
    record::ReconstructionRecord,
    types::ScriptType,
};

/// 署名に必要な前出力とスクリプト種別
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignableInput {
    pub prevout: TxOut,
    pub script_type: ScriptType,
}

// 署名に必要な情報を一時的に保持するための構造体
struct SigningInfo {
    input_index: usize,
    sighash_message: Message,
    script_type: ScriptType,
}

fn push_bytes(input_index: usize, bytes: Vec<u8>) -> Result<PushBytesBuf, AppError> {
    PushBytesBuf::try_from(bytes).map_err(|e| AppError::signing_failed(input_index, format!("PushBytes変換失敗: {}", e)))
}

/// 全入力に署名したトランザクションを返す。1つでも失敗した場合は何も返さない。
///
/// ECDSAはRFC6979、Schnorrは補助乱数なしなので、同じ入力集合なら常に同じ署名になる。
pub fn sign_transaction(
    unsigned: &Transaction,
    inputs: &[SignableInput],
    private_key: &PrivateKey,
    secp: &Secp256k1<All>,
) -> Result<Transaction, AppError> {
    if unsigned.input.len() != inputs.len() {
        return Err(AppError::Internal(format!(
            "入力数が一致しません: トランザクション {} 件, 署名情報 {} 件",
            unsigned.input.len(),
            inputs.len()
        )));
    }
    log::info!("トランザクション署名処理を開始します。入力 {} 件", inputs.len());

    let public_key = private_key.public_key(secp);
    for (input_index, input) in inputs.iter().enumerate() {
        let expected = source_script_pubkey(private_key, input.script_type, secp)
            .map_err(|e| AppError::signing_failed(input_index, e))?;
        if expected != input.prevout.script_pubkey {
            return Err(AppError::signing_failed(
                input_index,
                "秘密鍵が入力のアドレスと一致しません",
            ));
        }
    }

    let prevouts: Vec<TxOut> = inputs.iter().map(|i| i.prevout.clone()).collect();
    let mut signing_infos: Vec<SigningInfo> = Vec::with_capacity(inputs.len());

    // 1. 署名ハッシュ計算フェーズ
    {
        let mut sighash_cache = SighashCache::new(unsigned);
        for (input_index, input) in inputs.iter().enumerate() {
            log::debug!(
                "入力 {} ({}) の署名ハッシュ計算を開始します。",
                input_index,
                input.script_type
            );
            let digest = match input.script_type {
                ScriptType::Legacy => sighash_cache
                    .legacy_signature_hash(
                        input_index,
                        &input.prevout.script_pubkey,
                        EcdsaSighashType::All.to_u32(),
                    )
                    .map_err(|e| AppError::signing_failed(input_index, e))?
                    .to_byte_array(),
                ScriptType::P2shSegwit => {
                    // BIP143の署名対象はP2SH内部のP2WPKHスクリプト
                    let inner = p2wpkh_script(&public_key).map_err(|e| AppError::signing_failed(input_index, e))?;
                    sighash_cache
                        .p2wpkh_signature_hash(input_index, &inner, input.prevout.value, EcdsaSighashType::All)
                        .map_err(|e| AppError::signing_failed(input_index, e))?
                        .to_byte_array()
                }
                ScriptType::Segwit => sighash_cache
                    .p2wpkh_signature_hash(
                        input_index,
                        &input.prevout.script_pubkey,
                        input.prevout.value,
                        EcdsaSighashType::All,
                    )
                    .map_err(|e| AppError::signing_failed(input_index, e))?
                    .to_byte_array(),
                ScriptType::Taproot => sighash_cache
                    .taproot_key_spend_signature_hash(input_index, &Prevouts::All(&prevouts), TapSighashType::Default)
                    .map_err(|e| AppError::signing_failed(input_index, e))?
                    .to_byte_array(),
            };
            signing_infos.push(SigningInfo {
                input_index,
                sighash_message: Message::from_digest(digest),
                script_type: input.script_type,
            });
        }
    }

    // 2. 署名生成と適用フェーズ
    let mut transaction = unsigned.clone();
    let keypair = Keypair::from_secret_key(secp, &private_key.inner);
    for info in signing_infos {
        let tx_in = &mut transaction.input[info.input_index];
        match info.script_type {
            ScriptType::Legacy => {
                let signature = ecdsa::Signature::sighash_all(secp.sign_ecdsa(&info.sighash_message, &private_key.inner));
                tx_in.script_sig = Builder::new()
                    .push_slice(push_bytes(info.input_index, signature.to_vec())?)
                    .push_key(&public_key)
                    .into_script();
            }
            ScriptType::P2shSegwit => {
                let signature = ecdsa::Signature::sighash_all(secp.sign_ecdsa(&info.sighash_message, &private_key.inner));
                let redeem_script: ScriptBuf =
                    p2wpkh_script(&public_key).map_err(|e| AppError::signing_failed(info.input_index, e))?;
                tx_in.script_sig = Builder::new()
                    .push_slice(push_bytes(info.input_index, redeem_script.into_bytes())?)
                    .into_script();
                let mut witness = Witness::new();
                witness.push(signature.to_vec());
                witness.push(public_key.to_bytes());
                tx_in.witness = witness;
            }
            ScriptType::Segwit => {
                let signature = ecdsa::Signature::sighash_all(secp.sign_ecdsa(&info.sighash_message, &private_key.inner));
                let mut witness = Witness::new();
                witness.push(signature.to_vec());
                witness.push(public_key.to_bytes());
                tx_in.witness = witness;
            }
            ScriptType::Taproot => {
                let tweaked = keypair.tap_tweak(secp, None);
                let signature = taproot::Signature {
                    signature: secp.sign_schnorr_no_aux_rand(&info.sighash_message, &tweaked.to_keypair()),
                    sighash_type: TapSighashType::Default,
                };
                let mut witness = Witness::new();
                witness.push(signature.to_vec());
                tx_in.witness = witness;
            }
        }
        log::debug!("入力 {} ({}) の署名適用完了。", info.input_index, info.script_type);
    }
    log::info!("全ての入力の署名が完了しました。");

    Ok(transaction)
}

/// unsigned_data から入力を再構築して署名する。
///
/// `expected_unsigned_hex` が与えられた場合、再構築した未署名トランザクションが
/// それと完全に一致することを確認してから署名する。
///
/// `source_address` のないレコードでは前出力を鍵自身から導くので、別の鍵を渡しても
/// `SigningFailed` にはならず、使用できない署名済みトランザクションが返る。
pub fn sign_record(
    record: &ReconstructionRecord,
    private_key: &PrivateKey,
    expected_unsigned_hex: Option<&str>,
    secp: &Secp256k1<All>,
) -> Result<Transaction, AppError> {
    // 1. レコードの検証
    let validated = record.validate()?;
    log::info!(
        "unsigned_dataを検証しました。ネットワーク {:?}, 入力 {} 件, 出力 {} 件, 手数料 {} sats",
        validated.network,
        validated.inputs.len(),
        validated.outputs.len(),
        validated.fee_sats
    );

    // 2. 秘密鍵とネットワーク・送金元の照合
    if private_key.network != validated.network.into() {
        return Err(AppError::signing_failed(
            0,
            format!("秘密鍵のネットワーク ({:?}) が unsigned_data と一致しません", private_key.network),
        ));
    }

    let source_script = source_script_pubkey(private_key, validated.script_type, secp)
        .map_err(|e| AppError::signing_failed(0, e))?;
    if let Some(source) = &validated.source {
        if source.script_pubkey() != source_script {
            return Err(AppError::signing_failed(
                0,
                format!("秘密鍵が送金元アドレス {} と一致しません", source),
            ));
        }
    }

    if validated.source.is_none() {
        // 前出力のscriptPubKeyを鍵から導くため、別の鍵でも署名自体は成功してしまう
        log::warn!("unsigned_dataに送金元アドレスがないため、秘密鍵と送金元の一致を確認できません。");
    }

    // 3. 未署名トランザクションの再構築と照合
    let unsigned = build_unsigned_transaction(&validated.inputs, &validated.outputs);
    if let Some(expected_hex) = expected_unsigned_hex {
        verify_unsigned(&unsigned, expected_hex)?;
    }

    // 4. 保存された金額と鍵から導いたscriptPubKeyで前出力を復元して署名
    let inputs: Vec<SignableInput> = validated
        .inputs
        .iter()
        .map(|utxo| SignableInput {
            prevout: TxOut {
                value: utxo.amount(),
                script_pubkey: source_script.clone(),
            },
            script_type: utxo.script_type,
        })
        .collect();

    sign_transaction(&unsigned, &inputs, private_key, secp)
}

fn verify_unsigned(rebuilt: &Transaction, expected_hex: &str) -> Result<(), AppError> {
    let expected = hex::decode(expected_hex.trim())
        .map_err(|e| AppError::MalformedRecord(format!("unsigned_tx.hex のデコードに失敗: {}", e)))?;
    if encode::serialize(rebuilt) != expected {
        return Err(AppError::MalformedRecord(
            "unsigned_data から再構築したトランザクションが unsigned_tx.hex と一致しません".to_string(),
        ));
    }
    Ok(())
}
