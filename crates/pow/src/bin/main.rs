//! Command line front end for the proof of work rules.
//!
//! Reads a JSON header history (an array of `{"height", "time", "bits"}`
//! objects with consecutive heights), prints the compact target required for
//! the next block and optionally checks a block hash against it.

use std::{fs, path::PathBuf};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoUtc};
use unicity_prism_pow::{
    ChainEntry, CompactTarget, HeaderChain, Network, Target, check_proof_of_work,
    retarget::RetargetRules,
    util::{display_hex_to_blockhash, target_to_hex},
};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Network whose consensus rules apply (mainnet, testnet, regtest).
    #[arg(short, long, default_value = "mainnet")]
    network: Network,

    /// JSON file with the header history, oldest first.
    #[arg(long)]
    headers: PathBuf,

    /// Timestamp of the candidate block (defaults to one target spacing
    /// after the tip).
    #[arg(long)]
    time: Option<i64>,

    /// Block hash to check, in the usual reversed hex notation.
    #[arg(long)]
    hash: Option<String>,

    /// Compact target claimed by the block (defaults to the required one).
    #[arg(long)]
    bits: Option<CompactTarget>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Initializes tracing with the specified log level.
fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(&args);

    let params = args.network.consensus_params();
    let contents = fs::read_to_string(&args.headers)?;
    let chain: HeaderChain = serde_json::from_str(&contents)?;
    info!(network = %args.network, headers = chain.len(), "Loaded header history");

    let tip = chain.tip();
    let time = match (args.time, tip) {
        (Some(time), _) => time,
        (None, Some(tip)) => tip.time().saturating_add_unsigned(params.pow_target_spacing),
        (None, None) => 0,
    };
    if let Some(tip) = tip {
        let rules = RetargetRules::for_height(tip.height(), &params)?;
        debug!(height = tip.height(), ?rules, "Rules for next block");
    }

    let required = chain.next_work_required(time, &params)?;
    let target = Target::from_compact(required).unwrap_or(Target::zero());
    println!("bits {required}");
    println!("target {}", target_to_hex(&target));
    if let Some(difficulty) = target.difficulty_float(params.max_attainable_target) {
        println!("difficulty {difficulty}");
    }

    if let Some(hash) = args.hash {
        let hash = display_hex_to_blockhash(&hash)?;
        let bits = args.bits.unwrap_or(required);
        if bits != required {
            println!("bits mismatch: header claims {bits}, chain requires {required}");
        }
        let valid = check_proof_of_work(hash, bits, &params);
        println!("proof of work {}", if valid { "valid" } else { "invalid" });
        if !valid || bits != required {
            return Err("block rejected".into());
        }
    }

    Ok(())
}
