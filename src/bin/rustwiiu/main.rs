// main.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Base for the rustwiiu CLI that handles argument parsing and directs execution to the proper module.

mod filetypes;
mod info;
mod title;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Print more log output (-v for info, -vv for debug); RUST_LOG overrides this
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Generate a certificate file for a title
    Cert {
        /// An (optional) output name; defaults to "title.cert"
        #[arg(short, long)]
        output: Option<String>,
        /// A TMD downloaded from the CDN to take the CA and CP certificates from
        #[arg(long, requires = "cetk")]
        tmd: Option<String>,
        /// A Ticket downloaded from the CDN to take the XS certificate from
        #[arg(long, requires = "tmd")]
        cetk: Option<String>,
    },
    /// Decrypt a downloaded title and extract its files
    Decrypt {
        /// The path to a download directory, or to the TMD or Ticket inside of one
        input: String,
        /// An (optional) output directory; defaults to the download directory
        #[arg(short, long)]
        output: Option<String>,
        /// A Ticket to use instead of the one in the download directory
        #[arg(long)]
        tik: Option<String>,
        /// Delete the encrypted contents, TMD, Ticket and certificate after extracting
        #[arg(long)]
        delete_encrypted: bool,
    },
    /// Get information about a TMD, Ticket, certificate file, or download directory
    Info {
        /// The path to a TMD, Ticket, certificate file, or download directory
        input: String,
    },
    /// Generate the Title Key for a title
    Keygen {
        /// The Title ID of the title (formatted as 16 hex characters)
        tid: String,
        /// The password to derive the key with; defaults to "mypass"
        #[arg(short, long)]
        password: Option<String>,
        /// Encrypt the key with the development common key instead of the retail one
        #[arg(long)]
        dev: bool,
    },
    /// Generate a Ticket for a title
    Ticket {
        /// The Title ID of the title (formatted as 16 hex characters)
        tid: String,
        /// The version of the title
        #[arg(short, long)]
        version: u16,
        /// The encrypted Title Key to put in the Ticket; generated if not provided
        #[arg(short, long)]
        key: Option<String>,
        /// An (optional) output name; defaults to "title.tik"
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Verify the contents of a downloaded title against the hashes in its TMD
    Verify {
        /// The path to a download directory
        dir: String,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Some(Commands::Cert { output, tmd, cetk }) => {
            title::keygen::cert(output, tmd, cetk)?
        },
        Some(Commands::Decrypt { input, output, tik, delete_encrypted }) => {
            title::decrypt::decrypt(input, output, tik, *delete_encrypted)?
        },
        Some(Commands::Info { input }) => {
            info::info(input)?
        },
        Some(Commands::Keygen { tid, password, dev }) => {
            title::keygen::keygen(tid, password, *dev)?
        },
        Some(Commands::Ticket { tid, version, key, output }) => {
            title::keygen::ticket(tid, *version, key, output)?
        },
        Some(Commands::Verify { dir }) => {
            title::decrypt::verify(dir)?
        },
        None => { /* Clap handles no passed command by itself */}
    }
    Ok(())
}
