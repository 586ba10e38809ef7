use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{error::AppError, record::ReconstructionRecord};

pub const UNSIGNED_TX_FILE: &str = "unsigned_tx.hex";
pub const UNSIGNED_DATA_FILE: &str = "unsigned_data.json";

fn write_file(path: &Path, content: &str) -> Result<(), AppError> {
    let mut file = File::create(path).map_err(|e| {
        log::error!("出力ファイルの作成に失敗しました: {:?}", path);
        AppError::Io(e)
    })?;
    file.write_all(content.as_bytes()).map_err(|e| {
        log::error!("出力ファイルへの書き込みに失敗しました: {:?}", path);
        AppError::Io(e)
    })
}

/// 未署名hexとunsigned_dataを書き出す。どちらかが失敗した場合はファイルを残さない。
pub fn write_unsigned(dir: &Path, tx_hex: &str, record: &ReconstructionRecord) -> Result<(PathBuf, PathBuf), AppError> {
    let json = record.to_json_pretty()?;
    let hex_path = dir.join(UNSIGNED_TX_FILE);
    let data_path = dir.join(UNSIGNED_DATA_FILE);

    write_file(&hex_path, tx_hex)?;
    if let Err(e) = write_file(&data_path, &json) {
        let _ = fs::remove_file(&hex_path);
        return Err(e);
    }
    log::info!("未署名トランザクションを {:?} に、unsigned_dataを {:?} に保存しました。", hex_path, data_path);
    Ok((hex_path, data_path))
}

pub fn write_signed(path: &Path, tx_hex: &str) -> Result<(), AppError> {
    write_file(path, tx_hex)?;
    log::info!("Raw transactionを {:?} に保存しました。", path);
    Ok(())
}

pub fn read_record(path: &Path) -> Result<ReconstructionRecord, AppError> {
    let content = fs::read_to_string(path).map_err(|e| {
        log::error!("unsigned_dataの読み込みに失敗しました: {:?}", path);
        AppError::Io(e)
    })?;
    ReconstructionRecord::from_json(&content)
}

pub fn read_unsigned_hex(path: &Path) -> Result<String, AppError> {
    let content = fs::read_to_string(path).map_err(|e| {
        log::error!("未署名トランザクションの読み込みに失敗しました: {:?}", path);
        AppError::Io(e)
    })?;
    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{record::RecordInput, record::RecordOutput, types::ScriptType};

    fn record() -> ReconstructionRecord {
        ReconstructionRecord {
            network: "testnet".to_string(),
            source_address: None,
            fee_satoshis: 500,
            inputs: vec![RecordInput {
                txid: "ab".repeat(32),
                vout: 0,
                amount_satoshis: 10_500,
                script_type: ScriptType::Taproot,
            }],
            outputs: vec![RecordOutput {
                address: "tb1psmsr8rc6jwl47xsv4zahnt39m2peexxhxrfvprqpw86yf55rkzgq70ycww".to_string(),
                amount_satoshis: 10_000,
            }],
        }
    }

    #[test]
    fn unsigned_artifacts_are_written_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let (hex_path, data_path) = write_unsigned(dir.path(), "02000000", &record()).unwrap();
        assert_eq!(hex_path, dir.path().join(UNSIGNED_TX_FILE));
        assert_eq!(read_unsigned_hex(&hex_path).unwrap(), "02000000");
        assert_eq!(read_record(&data_path).unwrap(), record());
    }

    #[test]
    fn failed_data_write_leaves_no_hex_behind() {
        let dir = tempfile::tempdir().unwrap();
        // unsigned_data.json をディレクトリにして書き込みを失敗させる
        fs::create_dir(dir.path().join(UNSIGNED_DATA_FILE)).unwrap();
        let err = write_unsigned(dir.path(), "02000000", &record()).unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
        assert!(!dir.path().join(UNSIGNED_TX_FILE).exists());
    }

    #[test]
    fn missing_record_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(read_record(&dir.path().join("nope.json")), Err(AppError::Io(_))));
    }
}
