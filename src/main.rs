use bitcoin::consensus::encode;
use bitcoin::secp256k1::All as AllContext;
use bitcoin::secp256k1::Secp256k1;
use clap::Parser;

use bitcoin_tx_assembler::{
    artifacts,
    assembler::Assembled,
    classify::parse_address,
    cli::{BalanceArgs, CliArgs, Command, SendArgs, SignArgs},
    config::AppConfig,
    engine::{Providers, SendRequest, SourceSpec, run_send},
    error::AppError,
    http::HttpProviders,
    keys::parse_private_key,
    provider::UtxoProvider,
    report::TransactionDetails,
    signer::sign_record,
    types::{FeeSpec, SpendPlan, parse_network},
};

fn main() -> Result<(), AppError> {
    env_logger::init();

    let args = CliArgs::parse();
    // 引数には秘密鍵が含まれ得るのでログには出さない
    log::info!("アプリケーションを開始します。");

    let config = AppConfig::load(args.config.as_deref())?;
    let secp: Secp256k1<AllContext> = Secp256k1::new();

    match args.command {
        Command::Send(send_args) => run_send_command(send_args, &config, &secp)?,
        Command::Sign(sign_args) => run_sign_command(sign_args, &secp)?,
        Command::Balance(balance_args) => run_balance_command(balance_args, &config)?,
    }

    log::info!("処理が正常に完了しました。");
    Ok(())
}

fn run_send_command(args: SendArgs, config: &AppConfig, secp: &Secp256k1<AllContext>) -> Result<(), AppError> {
    let network = parse_network(&args.network)?;
    log::info!("指定されたネットワーク: {:?}", network);

    let request = SendRequest {
        target_address: args.target_address.clone(),
        source: SourceSpec::parse(&args.key_or_address, args.key_script_type, network)?,
        spend: SpendPlan::from_send_sats(args.send_sats),
        fee: FeeSpec::from_options(args.fee_rate, args.fee_usd, args.fee_source),
        network,
    };

    let http = HttpProviders::new(config)?;
    let providers = Providers::from_single(&http);
    let outcome = run_send(&request, &providers, config, secp)?;

    match &outcome.assembled {
        Assembled::Signed(_) => {
            if let Some(output_file) = &args.output_file {
                artifacts::write_signed(output_file, &outcome.assembled.to_hex())?;
            }
        }
        Assembled::Unsigned { transaction, record } => {
            let (hex_path, data_path) =
                artifacts::write_unsigned(&args.output_dir, &encode::serialize_hex(transaction), record)?;
            println!("未署名トランザクションを {} に書き出しました。", hex_path.display());
            println!("UTXOと詳細を {} に書き出しました。", data_path.display());
            println!("後で sign --data-file {} --private-key <KEY> で署名できます。", data_path.display());
        }
    }

    let details = TransactionDetails::from_outcome(&outcome, providers.prices);
    println!("{}", details.render());
    Ok(())
}

fn run_sign_command(args: SignArgs, secp: &Secp256k1<AllContext>) -> Result<(), AppError> {
    let record = artifacts::read_record(&args.data_file)?;
    let network = parse_network(&record.network).map_err(|e| AppError::MalformedRecord(e.to_string()))?;
    let private_key = parse_private_key(&args.private_key, network)?;

    let expected_unsigned = match &args.tx_file {
        Some(path) => Some(artifacts::read_unsigned_hex(path)?),
        None => None,
    };

    let signed_tx = sign_record(&record, &private_key, expected_unsigned.as_deref(), secp)?;
    log::info!("署名済みトランザクションの生成に成功しました。");

    let serialized_tx = encode::serialize_hex(&signed_tx);
    log::info!("Raw transaction hex: {}", serialized_tx);
    println!("=== 署名済みトランザクション Hex ===");
    println!("{}", serialized_tx);

    if let Some(output_file) = &args.output_file {
        artifacts::write_signed(output_file, &serialized_tx)?;
    }
    Ok(())
}

fn run_balance_command(args: BalanceArgs, config: &AppConfig) -> Result<(), AppError> {
    let network = parse_network(&args.network)?;
    let address = parse_address(&args.address, network)?;
    let http = HttpProviders::new(config)?;
    let balance = http.get_balance(&address, network)?;
    println!("{}: {} sats ({:.8} BTC)", address, balance, balance as f64 / 100_000_000.0);
    Ok(())
}
