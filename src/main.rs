//! Command-line front end for the retargeting engine
//!
//! One operation per invocation: decode or encode compact bits, validate a
//! proof-of-work hash, compute the next required work from a chain snapshot
//! file, or print a network's consensus parameters.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pow_retarget::{
    compact, required_work, BlockHash, BlockHeader, ChainAncestry, ChainIndex, CompactBits, Error,
    Network, Params, Result, Target, APP_NAME, APP_VERSION,
};

#[derive(Debug, Parser)]
#[command(
    name = "pow-retarget",
    version = env!("CARGO_PKG_VERSION"),
    about = "Proof-of-work difficulty retargeting and compact target tools"
)]
struct Args {
    /// Decode packed difficulty bits and print the 256-bit target
    #[arg(long, value_name = "BITS")]
    decode: Option<CompactBits>,

    /// Encode a 256-bit target (64 hex chars) into packed bits
    #[arg(long, value_name = "TARGET")]
    encode: Option<Target>,

    /// Validate a proof-of-work hash against packed bits
    #[arg(long)]
    check: bool,

    /// Block hash for --check (64 hex chars, big-endian)
    #[arg(long, value_name = "HASH")]
    hash: Option<BlockHash>,

    /// Packed difficulty bits for --check
    #[arg(long, value_name = "BITS")]
    bits: Option<CompactBits>,

    /// Compute the next required work from a chain snapshot file (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    next_work: Option<PathBuf>,

    /// Candidate header time for --next-work (defaults to tip time plus one spacing)
    #[arg(long, value_name = "SECONDS")]
    header_time: Option<i64>,

    /// Print the network's consensus parameters and exit
    #[arg(long)]
    print_params: bool,

    /// Network whose parameters apply
    #[arg(long, value_enum, default_value_t = Network::Main)]
    chain: Network,
}

/// One block of a chain snapshot, in height order starting at genesis
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotBlock {
    bits: CompactBits,
    time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    blocks: Vec<SnapshotBlock>,
}

impl Snapshot {
    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(Error::from)
        } else {
            // Default to YAML
            serde_yaml::from_str(&content).map_err(Error::from)
        }
    }

    /// Rebuild the chain index from the snapshot's linear history
    fn into_index(self) -> Result<ChainIndex> {
        let mut chain = ChainIndex::new();
        let mut prev = None;
        for block in self.blocks {
            prev = Some(chain.push(prev, block.bits, block.time)?);
        }
        Ok(chain)
    }
}

fn run_decode(bits: CompactBits) {
    let decoded = compact::decode(bits);
    println!("bits:     {}", bits);
    println!("target:   {}", decoded.target);
    println!("negative: {}", decoded.negative);
    println!("overflow: {}", decoded.overflow);
}

fn run_encode(target: Target) {
    println!("{}", compact::encode(target));
}

fn run_check(args: &Args, params: &Params) -> Result<()> {
    let hash = args
        .hash
        .ok_or_else(|| Error::config("--check requires --hash"))?;
    let bits = args
        .bits
        .ok_or_else(|| Error::config("--check requires --bits"))?;

    pow_retarget::check_proof_of_work(&hash, bits, params)?;
    println!("ok");
    Ok(())
}

fn run_next_work(path: &Path, header_time: Option<i64>, params: &Params) -> Result<()> {
    info!("{} v{} computing next work on {}", APP_NAME, APP_VERSION, params.network);
    let snapshot = Snapshot::load(path)?;
    debug!(blocks = snapshot.blocks.len(), "loaded chain snapshot");

    let chain = snapshot.into_index()?;
    let tip = chain.tip();

    let time = match (header_time, tip) {
        (Some(time), _) => time,
        (None, Some(tip)) => chain.time(tip) + params.pow_target_spacing,
        (None, None) => 0,
    };
    let header = BlockHeader {
        bits: CompactBits::new(0),
        time,
        hash: BlockHash::from_u256(primitive_types::U256::zero()),
    };

    let bits = required_work(&chain, tip, &header, params)?;
    println!("{}", bits);
    Ok(())
}

fn run_print_params(params: &Params) -> Result<()> {
    print!("{}", serde_yaml::to_string(params)?);
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let params = Params::for_network(args.chain).validated()?;

    if let Some(bits) = args.decode {
        run_decode(bits);
        return Ok(());
    }

    if let Some(target) = args.encode {
        run_encode(target);
        return Ok(());
    }

    if args.check {
        return run_check(&args, &params);
    }

    if let Some(path) = &args.next_work {
        return run_next_work(path, args.header_time, &params);
    }

    if args.print_params {
        return run_print_params(&params);
    }

    Err(Error::config(
        "no operation selected; see --help for the available flags",
    ))
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error [{}]: {}", e.category(), e);
        std::process::exit(1);
    }
}
