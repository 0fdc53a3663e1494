//! blocksync - file-to-file delta synchronization tool
//!
//! Thin plumbing over the library: opens the files, picks a block size,
//! and reports what happened. All the actual work happens in the crate.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use blocksync::{
    calculate_block_size, compute_deltas, generate_signatures, read_signatures, rebuild,
};

#[derive(Parser, Debug)]
#[command(name = "blocksync")]
#[command(version, about = "Rsync-style delta synchronization between files", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the block signature of a reference file
    Signature(SignatureArgs),

    /// Compute a delta from a signature file and a basis file
    Delta(DeltaArgs),

    /// Rebuild the basis from a reference file and a delta file
    Patch(PatchArgs),

    /// Print a signature file in readable form
    DumpSig(DumpSigArgs),
}

#[derive(Parser, Debug)]
struct SignatureArgs {
    /// Reference file to summarize
    reference: PathBuf,

    /// Signature file to write
    output: PathBuf,

    /// Block size in bytes [default: sized from the reference length]
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    block_size: Option<u32>,
}

#[derive(Parser, Debug)]
struct DeltaArgs {
    /// Signature of the receiver's reference file
    signature: PathBuf,

    /// Basis file to scan (the current content)
    basis: PathBuf,

    /// Delta file to write
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct PatchArgs {
    /// Reference file the delta was computed against
    reference: PathBuf,

    /// Delta file to apply
    delta: PathBuf,

    /// Rebuilt file to write
    output: PathBuf,

    /// Block size the signature was generated with
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    block_size: u32,
}

#[derive(Parser, Debug)]
struct DumpSigArgs {
    /// Signature file to print
    signature: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Signature(args) => run_signature(args),
        Commands::Delta(args) => run_delta(args),
        Commands::Patch(args) => run_patch(args),
        Commands::DumpSig(args) => run_dump_sig(args),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "blocksync=warn",
        1 => "blocksync=info",
        2 => "blocksync=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_signature(args: SignatureArgs) -> Result<()> {
    let reference = File::open(&args.reference)
        .with_context(|| format!("opening reference {}", args.reference.display()))?;
    let len = reference
        .metadata()
        .with_context(|| format!("reading metadata of {}", args.reference.display()))?
        .len();
    let block_size = args.block_size.unwrap_or_else(|| calculate_block_size(len));

    let out = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("creating signature {}", args.output.display()))?,
    );
    let blocks = generate_signatures(BufReader::new(reference), block_size, out)?;

    tracing::info!(
        reference = %args.reference.display(),
        block_size,
        blocks,
        "signature written"
    );
    Ok(())
}

fn run_delta(args: DeltaArgs) -> Result<()> {
    let sig_file = File::open(&args.signature)
        .with_context(|| format!("opening signature {}", args.signature.display()))?;
    let sig = read_signatures(BufReader::new(sig_file))?;

    let basis = File::open(&args.basis)
        .with_context(|| format!("opening basis {}", args.basis.display()))?;
    let out = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("creating delta {}", args.output.display()))?,
    );

    let stats = compute_deltas(&sig, BufReader::new(basis), out)?;
    println!(
        "{} ops: {} bytes copied, {} bytes literal ({:.1}% reused)",
        stats.ops,
        stats.bytes_copied,
        stats.bytes_literal,
        stats.savings_percent()
    );
    Ok(())
}

fn run_patch(args: PatchArgs) -> Result<()> {
    let reference = File::open(&args.reference)
        .with_context(|| format!("opening reference {}", args.reference.display()))?;
    let delta = File::open(&args.delta)
        .with_context(|| format!("opening delta {}", args.delta.display()))?;
    let out = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("creating output {}", args.output.display()))?,
    );

    let written = rebuild(reference, args.block_size, BufReader::new(delta), out)?;
    tracing::info!(
        output = %args.output.display(),
        bytes_written = written,
        "rebuild written"
    );
    Ok(())
}

fn run_dump_sig(args: DumpSigArgs) -> Result<()> {
    let sig_file = File::open(&args.signature)
        .with_context(|| format!("opening signature {}", args.signature.display()))?;
    let sig = read_signatures(BufReader::new(sig_file))?;

    println!(
        "block size {} bytes, {} blocks",
        sig.block_size,
        sig.block_count()
    );
    println!(
        "{:>8}  {:>12}  {:>8}  {:>8}  {}",
        "seq", "offset", "length", "weak", "strong"
    );
    for pair in &sig.pairs {
        println!(
            "{:>8}  {:>12}  {:>8}  {:08x}  {}",
            pair.sequence,
            pair.offset,
            pair.length,
            pair.weak,
            hex::encode(pair.strong)
        );
    }
    Ok(())
}
