#![forbid(unsafe_code)]

//! valv CLI: inspect, convert and create PKCS#12 files.

use base64::Engine;
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use valv::core::{algorithm, Error};
use valv::crypto::AlgorithmRegistry;
use valv::keys::{loader, KeyKind};
use valv::pkcs12::asn1::Pfx;
use valv::pkcs12::{Opts, Pkcs12};

#[derive(Parser)]
#[command(
    name = "valv",
    about = "Inspect, convert and create PKCS#12 (.p12/.pfx) files",
    version
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the contents of a PKCS#12 file
    Info {
        /// Input .p12/.pfx file
        file: PathBuf,

        /// Container password
        #[arg(short, long, default_value = "")]
        password: String,

        /// Print the secret key (base64) if present
        #[arg(long)]
        reveal: bool,
    },

    /// Re-encode a PKCS#12 file under new protection settings
    Convert {
        /// Input .p12/.pfx file
        input: PathBuf,

        /// Output file
        output: PathBuf,

        /// Password of the input file
        #[arg(short, long, default_value = "")]
        password: String,

        /// Password for the output file (default: the input password)
        #[arg(long = "new-password")]
        new_password: Option<String>,

        /// Protection preset
        #[arg(long, default_value = "modern-2023")]
        preset: String,

        /// Override KDF and MAC iteration counts
        #[arg(long)]
        iterations: Option<u32>,
    },

    /// Build a PKCS#12 file from PEM/DER keys and certificates
    Create {
        /// Output file
        output: PathBuf,

        /// Private key (PKCS#8 or PKCS#1, PEM or DER)
        #[arg(short = 'k', long)]
        key: Option<PathBuf>,

        /// End-entity certificate (PEM or DER)
        #[arg(short = 'c', long)]
        cert: Option<PathBuf>,

        /// CA certificates (PEM bundles allowed)
        #[arg(long)]
        ca: Vec<PathBuf>,

        /// Trusted certificate as ALIAS:FILE
        #[arg(long)]
        trusted: Vec<String>,

        /// Raw secret key file
        #[arg(long)]
        secret: Option<PathBuf>,

        /// friendlyName for the key and certificate
        #[arg(long)]
        name: Option<String>,

        /// Container password
        #[arg(short, long, default_value = "")]
        password: String,

        /// Protection preset
        #[arg(long, default_value = "modern-2023")]
        preset: String,
    },

    /// List supported algorithms, key types and presets
    Algorithms,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Info {
            file,
            password,
            reveal,
        } => cmd_info(&file, &password, reveal),

        Commands::Convert {
            input,
            output,
            password,
            new_password,
            preset,
            iterations,
        } => cmd_convert(
            &input,
            &output,
            &password,
            new_password.as_deref(),
            &preset,
            iterations,
        ),

        Commands::Create {
            output,
            key,
            cert,
            ca,
            trusted,
            secret,
            name,
            password,
            preset,
        } => cmd_create(CreateArgs {
            output,
            key,
            cert,
            ca,
            trusted,
            secret,
            name,
            password,
            preset,
        }),

        Commands::Algorithms => cmd_algorithms(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish()
        .with(filter)
        .init();
}

fn cmd_info(file: &Path, password: &str, reveal: bool) -> Result<(), Error> {
    let der = read_file(file)?;
    let pfx = Pfx::decode(&der)?;
    let p12 = Pkcs12::parse(&der, password)?;

    match &pfx.mac_data {
        Some(mac) if mac.mac.algorithm.is(algorithm::PBMAC1) => println!("MAC: PBMAC1"),
        Some(mac) => {
            let name = AlgorithmRegistry::global()
                .hash(&mac.mac.algorithm.oid)
                .map(|h| h.name().to_string())
                .unwrap_or_else(|_| algorithm::dotted(&mac.mac.algorithm.oid));
            println!("MAC: {name}, {} iterations", mac.iterations);
        }
        None => println!("MAC: none"),
    }

    if let Some(key) = p12.private_key() {
        println!("Private key: {}", key.kind());
        print_attributes(p12.private_key_attributes());
    }
    if let Some(cert) = p12.cert() {
        println!("Certificate:");
        println!("  subject: {}", cert.subject());
        println!("  issuer:  {}", cert.issuer());
        println!("  serial:  {}", hex::encode(cert.serial_number()));
        print_attributes(p12.cert_attributes());
    }
    for (i, ca) in p12.ca_certs().iter().enumerate() {
        println!("CA certificate {i}: {}", ca.subject());
    }
    for entry in p12.trust_store_entries() {
        println!(
            "Trusted certificate '{}': {}",
            entry.friendly_name,
            entry.certificate.subject()
        );
    }
    if let Some(secret) = p12.secret_key() {
        println!("Secret key: {} bytes", secret.len());
        if reveal {
            println!(
                "  value: {}",
                base64::engine::general_purpose::STANDARD.encode(secret)
            );
        }
        print_attributes(p12.secret_key_attributes());
    }
    if !p12.crls().is_empty() {
        println!("CRLs: {}", p12.crls().len());
    }
    for bag in p12.unknown_bags() {
        println!("Unrecognized bag: {}", algorithm::dotted(&bag.bag_id));
    }
    Ok(())
}

fn print_attributes(attrs: &valv::pkcs12::BagAttributes) {
    if let Some(id) = &attrs.local_key_id {
        println!("  localKeyId: {}", hex::encode(id));
    }
    if let Some(name) = &attrs.friendly_name {
        println!("  friendlyName: {name}");
    }
}

fn cmd_convert(
    input: &Path,
    output: &Path,
    password: &str,
    new_password: Option<&str>,
    preset: &str,
    iterations: Option<u32>,
) -> Result<(), Error> {
    let der = read_file(input)?;
    let p12 = Pkcs12::parse(&der, password)?;
    let mut opts = lookup_preset(preset)?;
    if let Some(n) = iterations {
        opts = opts.with_iterations(n);
    }
    tracing::info!(input = %input.display(), preset, "converting");
    let out = p12.marshal(&mut rand::rngs::OsRng, new_password.unwrap_or(password), &opts)?;
    write_file(output, &out)
}

struct CreateArgs {
    output: PathBuf,
    key: Option<PathBuf>,
    cert: Option<PathBuf>,
    ca: Vec<PathBuf>,
    trusted: Vec<String>,
    secret: Option<PathBuf>,
    name: Option<String>,
    password: String,
    preset: String,
}

fn cmd_create(args: CreateArgs) -> Result<(), Error> {
    let opts = lookup_preset(&args.preset)?;
    let mut p12 = Pkcs12::new();

    if let Some(path) = &args.key {
        p12 = p12.add_private_key(loader::load_private_key_file(path)?);
    }
    if let Some(path) = &args.cert {
        let mut certs = loader::load_certificates_file(path)?.into_iter();
        let leaf = certs
            .next()
            .ok_or_else(|| Error::Certificate(format!("{}: no certificate", path.display())))?;
        // Anything after the leaf in the same bundle is chain.
        p12 = p12.add_cert(leaf).add_ca_certs(certs);
    }
    for path in &args.ca {
        p12 = p12.add_ca_certs(loader::load_certificates_file(path)?);
    }
    for arg in &args.trusted {
        let (alias, file) = arg.split_once(':').ok_or_else(|| {
            Error::InvalidConfig(format!("invalid trusted format: {arg} (expected ALIAS:FILE)"))
        })?;
        for cert in loader::load_certificates_file(Path::new(file))? {
            p12 = p12.add_trust_store_entry(cert, alias);
        }
    }
    if let Some(path) = &args.secret {
        p12 = p12.add_secret_key(read_file(path)?);
    }
    if let Some(name) = args.name {
        p12 = p12.with_friendly_name(name);
    }

    tracing::info!(output = %args.output.display(), preset = %args.preset, "creating");
    let out = p12.marshal(&mut rand::rngs::OsRng, &args.password, &opts)?;
    write_file(&args.output, &out)
}

fn cmd_algorithms() -> Result<(), Error> {
    let registry = AlgorithmRegistry::global();
    println!("Digests (MAC, PBKDF2 PRF, PKCS#12 KDF):");
    for hash in registry.hashes() {
        println!("  {}", hash.name());
    }
    println!();
    println!("Ciphers:");
    for cipher in registry.ciphers() {
        println!("  {}", cipher.name());
    }
    println!();
    println!("Key transport (enveloped data):");
    println!("  RSA PKCS#1 v1.5, RSA-OAEP");
    println!();
    println!("Private key types:");
    for kind in KeyKind::ALL {
        println!("  {kind}");
    }
    println!();
    println!("Presets:");
    for name in Opts::PRESET_NAMES {
        println!("  {name}");
    }
    Ok(())
}

// ── Utility functions ────────────────────────────────────────────────

fn lookup_preset(name: &str) -> Result<Opts, Error> {
    Opts::preset(name).ok_or_else(|| {
        Error::InvalidConfig(format!(
            "unknown preset: {name} (expected one of {})",
            Opts::PRESET_NAMES.join(", ")
        ))
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|e| Error::Other(format!("{}: {e}", path.display())))
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), Error> {
    std::fs::write(path, data).map_err(|e| Error::Other(format!("{}: {e}", path.display())))
}
