use std::str::FromStr;

use bitcoin::{Address, AddressType, Network as BitcoinNetwork};

use crate::{error::AppError, types::ScriptType};

/// 文字列をアドレスとして解釈し、指定ネットワークに属することを確認する
pub fn parse_address(address: &str, network: BitcoinNetwork) -> Result<Address, AppError> {
    Address::from_str(address)
        .and_then(|addr| addr.require_network(network))
        .map_err(|e| AppError::invalid_address(address, e))
}

pub fn classify(address: &str, network: BitcoinNetwork) -> Result<ScriptType, AppError> {
    let parsed = parse_address(address, network)?;
    classify_address(&parsed)
}

/// 単一鍵で署名できるアドレス種別のみを受け付ける
pub fn classify_address(address: &Address) -> Result<ScriptType, AppError> {
    match address.address_type() {
        Some(AddressType::P2pkh) => Ok(ScriptType::Legacy),
        // P2SHは単一鍵のP2WPKHラップとして扱う
        Some(AddressType::P2sh) => Ok(ScriptType::P2shSegwit),
        Some(AddressType::P2wpkh) => Ok(ScriptType::Segwit),
        Some(AddressType::P2tr) => Ok(ScriptType::Taproot),
        Some(other) => Err(AppError::invalid_address(
            &address.to_string(),
            format!("単一鍵では扱えないアドレス種別です: {:?}", other),
        )),
        None => Err(AppError::invalid_address(
            &address.to_string(),
            "不明なwitnessバージョンのアドレスです",
        )),
    }
}
