use psobf_core::config::{FormatMode, IdentifierMode, Options, StringEncryption};
use psobf_core::{ResolvedOptions, obfuscate_resolved, obfuscate_variants};

use anyhow::{Context, bail};
use clap::Parser;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "psobf.toml";

#[derive(Parser, Debug)]
#[clap(author, version, about = "PowerShell script obfuscator", long_about = None)]
struct Cli {
    /// PowerShell script to read (or use --stdin).
    #[clap(short, long, value_parser)]
    input: Option<PathBuf>,
    /// Output file (or use --stdout).
    #[clap(short, long, value_parser, default_value = "obfuscated.ps1")]
    output: PathBuf,
    #[clap(long)]
    stdin: bool,
    #[clap(long)]
    stdout: bool,
    /// TOML file with option defaults. Flags override it.
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,

    /// Final encoding level (1..5).
    #[clap(short, long)]
    level: Option<u8>,
    /// Emit only the payload, without Invoke-Expression.
    #[clap(long)]
    no_exec: bool,
    /// Comma-separated transforms: iden,strenc,stringdict,numenc,fmt,cf,dead.
    #[clap(long)]
    pipeline: Option<String>,
    /// Identifier morphing: obf|keep.
    #[clap(long)]
    iden: Option<IdentifierMode>,
    /// Same as --iden obf.
    #[clap(long)]
    varrename: bool,
    /// String tokenization percentage (0..100).
    #[clap(long)]
    stringdict: Option<u8>,
    /// String encryption: off|xor|rc4.
    #[clap(long)]
    strenc: Option<StringEncryption>,
    /// Hex key for --strenc.
    #[clap(long)]
    strkey: Option<String>,
    #[clap(long)]
    numenc: bool,
    /// Format jitter: off|jitter.
    #[clap(long)]
    fmt: Option<FormatMode>,
    #[clap(long)]
    cf_opaque: bool,
    #[clap(long)]
    cf_shuffle: bool,
    /// Dead-code injection probability (0..100).
    #[clap(long)]
    deadcode: Option<u8>,
    /// Minimum fragment size (level 5).
    #[clap(long)]
    minfrag: Option<usize>,
    /// Maximum fragment size (level 5).
    #[clap(long)]
    maxfrag: Option<usize>,
    /// Fragmentation profile: profile=tight|medium|loose.
    #[clap(long)]
    frag: Option<String>,
    /// Preset: light|balanced|heavy.
    #[clap(long)]
    profile: Option<String>,
    /// RNG seed for reproducible output.
    #[clap(long)]
    seed: Option<u64>,
    /// Write N variants with derived seeds instead of one output.
    #[clap(long, default_value_t = 0)]
    fuzz: usize,

    /// Do not report written files.
    #[clap(short, long)]
    quiet: bool,
    /// Debug logging on stderr. RUST_LOG takes precedence.
    #[clap(short, long)]
    verbose: bool,
}

impl Cli {
    /// Knobs given on the command line. Unset flags stay `None` so they do not
    /// shadow the config file or the profile.
    fn options(&self) -> Options {
        let identifiers = match (self.iden, self.varrename) {
            (Some(mode), _) => Some(mode),
            (None, true) => Some(IdentifierMode::Obf),
            (None, false) => None,
        };
        Options {
            level: self.level,
            no_exec: self.no_exec,
            pipeline: self.pipeline.clone(),
            identifiers,
            string_dict: self.stringdict,
            string_encryption: self.strenc,
            string_key: self.strkey.clone(),
            number_encode: self.numenc.then_some(true),
            format: self.fmt,
            cf_opaque: self.cf_opaque.then_some(true),
            cf_shuffle: self.cf_shuffle.then_some(true),
            dead_code: self.deadcode,
            min_fragment: self.minfrag,
            max_fragment: self.maxfrag,
            fragment_profile: self.frag.clone(),
            profile: self.profile.clone(),
            seed: self.seed,
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_options(cli: &Cli) -> anyhow::Result<Options> {
    let file_options = match &cli.config_file {
        Some(path) => {
            info!(path = ?path, "loading configuration");
            Options::load_from_file(path)?
        }
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                info!(path = ?default_path, "loading default configuration");
                Options::load_from_file(default_path)?
            } else {
                Options::default()
            }
        }
    };
    Ok(file_options.overlay(cli.options()))
}

fn read_input(cli: &Cli) -> anyhow::Result<String> {
    if cli.stdin {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("could not read input from stdin")?;
        return Ok(text);
    }
    let Some(path) = &cli.input else {
        bail!("missing input: psobf -i <input.ps1> -o <output.ps1> --level <1..5> [options]");
    };
    std::fs::read_to_string(path).with_context(|| format!("could not read input {path:?}"))
}

/// `out.ps1` becomes `out.v3.ps1`; any other name gets a `.v3` suffix.
fn fuzz_output_path(base: &Path, index: usize) -> PathBuf {
    let base = base.to_string_lossy();
    if base.is_empty() {
        return PathBuf::from(format!("obfuscated.v{index}.ps1"));
    }
    if base.to_ascii_lowercase().ends_with(".ps1") {
        let stem = &base[..base.len() - ".ps1".len()];
        return PathBuf::from(format!("{stem}.v{index}.ps1"));
    }
    PathBuf::from(format!("{base}.v{index}"))
}

fn timestamp_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let options = load_options(cli)?;
    let resolved: ResolvedOptions = options.resolve()?;
    debug!(options = ?resolved, "effective configuration");

    if cli.fuzz > 0 && cli.stdout {
        bail!("cannot use --fuzz with --stdout");
    }
    let input = read_input(cli)?;

    if cli.fuzz > 0 {
        let base_seed = resolved.seed.unwrap_or_else(timestamp_seed);
        info!(count = cli.fuzz, base_seed, "generating variants");
        let variants = obfuscate_variants(&input, &options, cli.fuzz, base_seed)?;
        for (i, payload) in variants.iter().enumerate() {
            let path = fuzz_output_path(&cli.output, i + 1);
            std::fs::write(&path, payload)
                .with_context(|| format!("fuzz variant {} failed: could not write {path:?}", i + 1))?;
            if !cli.quiet {
                println!("Wrote: {}", path.display());
            }
        }
        return Ok(());
    }

    let payload = obfuscate_resolved(&input, &resolved)?;
    if cli.stdout {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(payload.as_bytes())?;
        stdout.flush()?;
    } else {
        std::fs::write(&cli.output, &payload)
            .with_context(|| format!("could not write output {:?}", cli.output))?;
        if !cli.quiet {
            println!("Wrote: {}", cli.output.display());
        }
    }
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if cli.input.is_some() && cli.stdin {
        warn!("both --input and --stdin given, reading stdin");
    }
    run(&cli)
}
