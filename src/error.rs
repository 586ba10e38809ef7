use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSONパースエラー ファイル: {file_path:?}, 詳細: {source}")]
    JsonParse {
        file_path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("無効なアドレス ({address}): {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("秘密鍵(WIF/hex)の読み込みに失敗しました: {0}")]
    InvalidKey(String),

    #[error("ネットワーク不整合: CLI指定 ({cli_network}) vs WIF/アドレス ({inferred_network})")]
    NetworkMismatch {
        cli_network: String,
        inferred_network: String,
    },

    #[error("手数料率が0以下です (解決結果: {0} sats/vB)")]
    NonPositiveFee(i64),

    #[error("BTC/USD価格の取得に失敗しました: {0}")]
    PriceUnavailable(String),

    #[error("手数料率の取得に失敗しました ({source_name}): {reason}")]
    QuoteUnavailable { source_name: String, reason: String },

    #[error("UTXOの取得に失敗しました: {0}")]
    UtxoUnavailable(String),

    #[error("資金不足: 利用可能な総額 {available} sats, 要求額 {required} sats (手数料 {fee} sats を含む)")]
    InsufficientFunds {
        available: u64,
        required: u64,
        fee: u64,
    },

    #[error("署名エラー (入力インデックス {input_index}): {reason}")]
    SigningFailed { input_index: usize, reason: String },

    #[error("unsigned_dataの内容が不正です: {0}")]
    MalformedRecord(String),

    #[error("入力検証エラー: {0}")]
    InputValidation(String),

    #[error("内部エラー: {0}")]
    Internal(String),
}

impl AppError {
    pub(crate) fn invalid_address(address: &str, reason: impl ToString) -> Self {
        AppError::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn signing_failed(input_index: usize, reason: impl ToString) -> Self {
        AppError::SigningFailed {
            input_index,
            reason: reason.to_string(),
        }
    }
}
