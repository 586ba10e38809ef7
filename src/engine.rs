use bitcoin::{
    Address, Network as BitcoinNetwork, PrivateKey,
    secp256k1::{All, Secp256k1},
};

use crate::{
    assembler::{Assembled, assemble},
    classify::{classify, classify_address, parse_address},
    config::AppConfig,
    error::AppError,
    fee::{self, ResolvedFee},
    keys::{parse_private_key, source_address_for_key},
    planner::{Plan, Planner},
    provider::{FeeQuoteProvider, PriceProvider, UtxoProvider},
    types::{FeeSpec, ScriptType, SpendPlan},
};

/// 送金元の指定。鍵ならその場で署名し、アドレスなら未署名で止める。
#[derive(Debug, Clone)]
pub enum SourceSpec {
    Key {
        private_key: PrivateKey,
        script_type: ScriptType,
    },
    Address(String),
}

impl SourceSpec {
    /// 秘密鍵として読めればその場で署名、読めなければアドレスとして扱う
    pub fn parse(key_or_address: &str, key_script_type: ScriptType, network: BitcoinNetwork) -> Result<Self, AppError> {
        match parse_private_key(key_or_address, network) {
            Ok(private_key) => {
                log::info!("秘密鍵が指定されました。スクリプト種別 {} で署名します。", key_script_type);
                Ok(SourceSpec::Key {
                    private_key,
                    script_type: key_script_type,
                })
            }
            Err(err @ AppError::NetworkMismatch { .. }) => Err(err),
            Err(_) => {
                let address = key_or_address.trim();
                classify(address, network)?;
                log::info!("アドレスが指定されました。未署名トランザクションを準備します。");
                Ok(SourceSpec::Address(address.to_string()))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub target_address: String,
    pub source: SourceSpec,
    pub spend: SpendPlan,
    pub fee: FeeSpec,
    pub network: BitcoinNetwork,
}

pub struct Providers<'a> {
    pub utxos: &'a dyn UtxoProvider,
    pub quotes: &'a dyn FeeQuoteProvider,
    pub prices: &'a dyn PriceProvider,
}

impl<'a> Providers<'a> {
    pub fn from_single<P>(provider: &'a P) -> Self
    where
        P: UtxoProvider + FeeQuoteProvider + PriceProvider,
    {
        Providers {
            utxos: provider,
            quotes: provider,
            prices: provider,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub source_address: Address,
    pub target_address: Address,
    pub network: BitcoinNetwork,
    pub total_balance_sats: u64,
    pub resolved_fee: ResolvedFee,
    pub plan: Plan,
    pub assembled: Assembled,
}

/// 送金元の決定 → UTXO取得 → 手数料の解決 → 選択 → 組み立て。
/// 外部I/OはUTXO取得と手数料の取得 (USD指定時は価格取得) の各1回だけ。
pub fn run_send(
    request: &SendRequest,
    providers: &Providers<'_>,
    config: &AppConfig,
    secp: &Secp256k1<All>,
) -> Result<SendOutcome, AppError> {
    let network = request.network;
    // 1. 送金元アドレスとスクリプト種別の決定
    let (source_address, script_type, signer) = match &request.source {
        SourceSpec::Key {
            private_key,
            script_type,
        } => {
            let address = source_address_for_key(private_key, *script_type, network, secp)?;
            (address, *script_type, Some(private_key))
        }
        SourceSpec::Address(address) => {
            let parsed = parse_address(address, network)?;
            let script_type = classify_address(&parsed)?;
            (parsed, script_type, None)
        }
    };
    let target_address = parse_address(&request.target_address, network)?;
    log::info!(
        "送金元: {} ({}), 送金先: {}, ネットワーク: {:?}",
        source_address,
        script_type,
        target_address,
        network
    );

    // 2. UTXOの取得
    let utxos = providers.utxos.get_utxos(&source_address, network)?;
    if utxos.is_empty() {
        log::warn!("{} に使用可能なUTXOがありません。", source_address);
    }
    let total_balance_sats = utxos.iter().map(|u| u.amount_sats).sum();

    // 3. 手数料方針の解決 (外部取得はここで1回だけ)
    let resolved_fee = fee::prepare(&request.fee, network, providers.quotes, providers.prices)?;

    // 4. UTXO選択とvsize見積もり
    let planner = Planner::new(
        source_address.clone(),
        target_address.clone(),
        script_type,
        config.dust_threshold_sats,
    )
    // 鍵が分かっていればその圧縮形式で見積もる
    .with_compressed_key(signer.is_none_or(|key| key.compressed));
    let plan = planner.plan(&utxos, request.spend, &resolved_fee)?;

    // 5. 鍵があれば署名、なければ未署名トランザクションとunsigned_data
    let assembled = assemble(&plan, &source_address, network, signer, secp)?;

    Ok(SendOutcome {
        source_address,
        target_address,
        network,
        total_balance_sats,
        resolved_fee,
        plan,
        assembled,
    })
}
