use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::types::{QuoteSource, ScriptType};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// 設定JSONファイルへのパス (省略時はデフォルト設定)
    #[clap(long, value_parser, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// トランザクションを作成する (秘密鍵なら署名、アドレスなら未署名ファイルを出力)
    Send(SendArgs),
    /// unsigned_data.json を秘密鍵で署名する
    Sign(SignArgs),
    /// アドレスの残高を表示する
    Balance(BalanceArgs),
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// 送金先アドレス
    pub target_address: String,

    /// 秘密鍵 (WIF/hex) でその場で署名、またはアドレスで未署名トランザクションを準備
    pub key_or_address: String,

    /// 送金額 (sats)。省略時は全額から手数料を引いた額
    #[clap(long, value_parser)]
    pub send_sats: Option<u64>,

    /// 手数料をUSDで指定 (--fee-source より優先)
    #[clap(long, value_parser)]
    pub fee_usd: Option<f64>,

    /// 手数料率 sats/vB (--fee-usd, --fee-source より優先)
    #[clap(long, value_parser)]
    pub fee_rate: Option<u64>,

    /// 手数料率の取得先
    #[clap(long, value_enum, default_value = "mempool")]
    pub fee_source: QuoteSource,

    /// 使用するネットワーク ("bitcoin", "testnet")
    #[clap(short, long, value_parser, default_value = "bitcoin")]
    pub network: String,

    /// 秘密鍵から送金元アドレスを導く際のスクリプト種別
    #[clap(long, value_enum, default_value = "legacy")]
    pub key_script_type: ScriptType,

    /// 未署名ファイルの出力先ディレクトリ
    #[clap(long, value_parser, default_value = ".")]
    pub output_dir: PathBuf,

    /// 署名済みraw transaction hexを保存するファイルへのパス
    #[clap(short, long, value_parser)]
    pub output_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// send で作成した unsigned_data.json へのパス
    #[clap(long, value_parser, default_value = "unsigned_data.json")]
    pub data_file: PathBuf,

    /// 秘密鍵 (WIF/hex)
    #[clap(long)]
    pub private_key: String,

    /// 照合用の unsigned_tx.hex へのパス
    #[clap(long, value_parser)]
    pub tx_file: Option<PathBuf>,

    /// 署名済みraw transaction hexを保存するファイルへのパス
    #[clap(short, long, value_parser)]
    pub output_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct BalanceArgs {
    pub address: String,

    /// 使用するネットワーク ("bitcoin", "testnet")
    #[clap(short, long, value_parser, default_value = "bitcoin")]
    pub network: String,
}
