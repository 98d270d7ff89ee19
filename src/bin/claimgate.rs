use anyhow::{anyhow, bail, Context};
use claimgate::{
    crypto::SignatureVerifier,
    token::{Asset, AssetRegistry, FungibleToken},
    AuthorityKey, ClaimGateConfig, ClaimMessage, ClaimRequest, ClaimService, Secp256k1Verifier,
    Signature,
};
use clap::{Arg, ArgMatches, Command};
use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// One claim in a replay file. Numbers are decimal or `0x` hex strings.
#[derive(Debug, Deserialize)]
struct ClaimSubmission {
    claimant: H160,
    #[serde(default)]
    resource: Option<H160>,
    amount: String,
    ceiling: String,
    #[serde(default = "zero")]
    source: String,
    signature: String,
}

fn zero() -> String {
    "0".to_string()
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ReplayOutcome {
    Accepted {
        claimant: H160,
        slot: H256,
        amount: String,
        total: String,
        nonce: String,
    },
    Rejected {
        claimant: H160,
        error: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("claimgate")
        .version(claimgate::VERSION)
        .about("Signed claim authorization and replay protection")
        .subcommand_required(true)
        .subcommand(Command::new("keygen").about("Generate a new authority key"))
        .subcommand(
            Command::new("authorize")
                .about("Sign a claim authorization")
                .arg(
                    Arg::new("secret")
                        .long("secret")
                        .help("Authority secret key (hex)")
                        .required(true),
                )
                .arg(
                    Arg::new("claimant")
                        .long("claimant")
                        .help("Address allowed to claim")
                        .required(true),
                )
                .arg(
                    Arg::new("ceiling")
                        .long("ceiling")
                        .help("Maximum cumulative amount")
                        .required(true),
                )
                .arg(
                    Arg::new("nonce")
                        .long("nonce")
                        .help("Claimant's next nonce")
                        .required(true),
                )
                .arg(
                    Arg::new("source")
                        .long("source")
                        .help("Source identifier")
                        .default_value("0"),
                )
                .arg(
                    Arg::new("resource")
                        .long("resource")
                        .help("Resource contract the claim is scoped to"),
                )
                .arg(
                    Arg::new("domain")
                        .long("domain")
                        .help("Domain (chain) id")
                        .default_value("31337"),
                ),
        )
        .subcommand(
            Command::new("recover")
                .about("Recover the signer of a message hash")
                .arg(
                    Arg::new("hash")
                        .long("hash")
                        .help("32-byte message hash (hex)")
                        .required(true),
                )
                .arg(
                    Arg::new("signature")
                        .long("signature")
                        .help("65-byte signature (hex)")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("replay")
                .about("Run a file of claims through a claim engine")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .help("Configuration file (JSON)")
                        .required(true),
                )
                .arg(
                    Arg::new("claims")
                        .long("claims")
                        .help("Claims file (JSON array)")
                        .required(true),
                )
                .arg(
                    Arg::new("snapshot")
                        .long("snapshot")
                        .help("Snapshot file, overrides the configuration"),
                )
                .arg(
                    Arg::new("domain")
                        .long("domain")
                        .help("Domain id, overrides the configuration"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("keygen", _)) => keygen(),
        Some(("authorize", sub)) => authorize(sub),
        Some(("recover", sub)) => recover(sub),
        Some(("replay", sub)) => replay(sub).await,
        _ => bail!("Unknown command"),
    }
}

fn keygen() -> anyhow::Result<()> {
    let key = AuthorityKey::generate();
    println!("secret:  {}", key.secret_hex());
    println!("address: {:?}", key.address());
    Ok(())
}

fn authorize(matches: &ArgMatches) -> anyhow::Result<()> {
    let key = AuthorityKey::from_hex(arg(matches, "secret")?)?;
    let resource = matches
        .get_one::<String>("resource")
        .map(|s| parse_address(s))
        .transpose()?;

    let message = ClaimMessage {
        domain_id: parse_u256(arg(matches, "domain")?)?,
        resource,
        ceiling: parse_u256(arg(matches, "ceiling")?)?,
        source: parse_u256(arg(matches, "source")?)?,
        claimant: parse_address(arg(matches, "claimant")?)?,
        nonce: parse_u256(arg(matches, "nonce")?)?,
    };

    let hash = message.hash();
    let signature = key.sign_hash(hash)?;

    println!("signer:    {:?}", key.address());
    println!("hash:      {:?}", hash);
    println!("signature: {}", signature);
    Ok(())
}

fn recover(matches: &ArgMatches) -> anyhow::Result<()> {
    let raw = arg(matches, "hash")?;
    let bytes = hex::decode(raw.strip_prefix("0x").unwrap_or(raw)).context("Hash is not valid hex")?;
    if bytes.len() != 32 {
        bail!("Hash must be 32 bytes, got {}", bytes.len());
    }

    let signature = Signature::from_hex(arg(matches, "signature")?)?;
    let signer = Secp256k1Verifier::new().recover_signer(H256::from_slice(&bytes), &signature)?;
    println!("{:?}", signer);
    Ok(())
}

async fn replay(matches: &ArgMatches) -> anyhow::Result<()> {
    let mut config = ClaimGateConfig::from_file(arg(matches, "config")?)?;
    if let Some(snapshot) = matches.get_one::<String>("snapshot") {
        config.snapshot_path = Some(PathBuf::from(snapshot));
    }
    if let Some(domain) = matches.get_one::<String>("domain") {
        config.domain_id = domain.parse().context("Invalid domain id")?;
    }
    config.validate()?;

    let raw = std::fs::read_to_string(arg(matches, "claims")?).context("Failed to read claims file")?;
    let submissions: Vec<ClaimSubmission> =
        serde_json::from_str(&raw).context("Claims file is not a JSON array of claims")?;

    let mut engine = config.load_engine()?;

    // every resource named by a claim, plus the engine itself, pays out in a
    // plain fungible token
    let mut payees: BTreeSet<H160> = submissions.iter().filter_map(|s| s.resource).collect();
    payees.insert(config.contract);
    let mut assets = AssetRegistry::new();
    for address in &payees {
        engine.reserve_address(*address);
        let token = FungibleToken::new(format!("{:?}", address), "CLM".to_string(), 18, *address);
        assets.register(*address, Asset::Fungible(token));
    }

    let service = ClaimService::new(engine, assets);
    tracing::info!("Replaying {} claims", submissions.len());

    for submission in submissions {
        let claimant = submission.claimant;
        let outcome = match to_request(&submission) {
            Ok(request) => match service.claim(claimant, request).await {
                Ok(receipt) => ReplayOutcome::Accepted {
                    claimant,
                    slot: receipt.slot,
                    amount: receipt.amount.to_string(),
                    total: receipt.total.to_string(),
                    nonce: receipt.nonce.to_string(),
                },
                Err(e) => ReplayOutcome::Rejected {
                    claimant,
                    error: e.to_string(),
                },
            },
            Err(e) => ReplayOutcome::Rejected {
                claimant,
                error: e.to_string(),
            },
        };
        println!("{}", serde_json::to_string(&outcome)?);
    }

    if let Some(store) = config.snapshot_store() {
        service.save(&store).await?;
    }

    Ok(())
}

fn to_request(submission: &ClaimSubmission) -> anyhow::Result<ClaimRequest> {
    Ok(ClaimRequest {
        resource: submission.resource,
        amount: parse_u256(&submission.amount)?,
        ceiling: parse_u256(&submission.ceiling)?,
        source: parse_u256(&submission.source)?,
        signature: Signature::from_hex(&submission.signature)?,
    })
}

fn arg<'a>(matches: &'a ArgMatches, name: &str) -> anyhow::Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow!("Missing --{}", name))
}

fn parse_u256(value: &str) -> anyhow::Result<U256> {
    match value.strip_prefix("0x") {
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16)
            .map_err(|_| anyhow!("Invalid hex number: {}", value)),
        None => U256::from_dec_str(value).map_err(|_| anyhow!("Invalid number: {}", value)),
    }
}

fn parse_address(value: &str) -> anyhow::Result<H160> {
    let bytes = hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .with_context(|| format!("Invalid address: {}", value))?;
    if bytes.len() != 20 {
        bail!("Address must be 20 bytes: {}", value);
    }
    Ok(H160::from_slice(&bytes))
}
