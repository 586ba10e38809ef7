use std::str::FromStr;

use bitcoin::{
    Address, Network as BitcoinNetwork, PrivateKey, PublicKey, ScriptBuf,
    secp256k1::{All, Keypair, Secp256k1, SecretKey},
};

use crate::{error::AppError, types::ScriptType};

/// WIF、または32バイトの16進数秘密鍵を読み込む
pub fn parse_private_key(input: &str, network: BitcoinNetwork) -> Result<PrivateKey, AppError> {
    let trimmed = input.trim();
    if let Ok(private_key) = PrivateKey::from_wif(trimmed) {
        if private_key.network != network.into() {
            return Err(AppError::NetworkMismatch {
                cli_network: format!("{:?}", network),
                inferred_network: format!("{:?}", private_key.network),
            });
        }
        return Ok(private_key);
    }

    // 16進数の場合は圧縮公開鍵として扱う
    let secret = SecretKey::from_str(trimmed)
        .map_err(|e| AppError::InvalidKey(format!("WIFでも16進数でもありません: {}", e)))?;
    Ok(PrivateKey::new(secret, network))
}

pub(crate) fn p2wpkh_script(public_key: &PublicKey) -> Result<ScriptBuf, AppError> {
    let wpubkey_hash = public_key
        .wpubkey_hash()
        .map_err(|e| AppError::InvalidKey(format!("segwitには圧縮公開鍵が必要です: {}", e)))?;
    Ok(ScriptBuf::new_p2wpkh(&wpubkey_hash))
}

/// 鍵とスクリプト種別から送金元の scriptPubKey を導く
pub fn source_script_pubkey(
    private_key: &PrivateKey,
    script_type: ScriptType,
    secp: &Secp256k1<All>,
) -> Result<ScriptBuf, AppError> {
    let public_key = private_key.public_key(secp);
    match script_type {
        ScriptType::Legacy => Ok(ScriptBuf::new_p2pkh(&public_key.pubkey_hash())),
        ScriptType::P2shSegwit => Ok(ScriptBuf::new_p2sh(&p2wpkh_script(&public_key)?.script_hash())),
        ScriptType::Segwit => p2wpkh_script(&public_key),
        ScriptType::Taproot => {
            let keypair = Keypair::from_secret_key(secp, &private_key.inner);
            let (internal_key, _parity) = keypair.x_only_public_key();
            Ok(ScriptBuf::new_p2tr(secp, internal_key, None))
        }
    }
}

pub fn source_address_for_key(
    private_key: &PrivateKey,
    script_type: ScriptType,
    network: BitcoinNetwork,
    secp: &Secp256k1<All>,
) -> Result<Address, AppError> {
    let script_pubkey = source_script_pubkey(private_key, script_type, secp)?;
    Address::from_script(&script_pubkey, network)
        .map_err(|e| AppError::Internal(format!("鍵からのアドレス導出に失敗: {}", e)))
}
