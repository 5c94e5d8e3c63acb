//! Command-line tool for remote SIM application management
//!
//! This binary loads, installs, deletes and lists applications on a SIM card
//! over OTA command packets, either through a PC/SC reader or, with
//! `--smpp`, by printing the secured user data for submission through an
//! SMSC.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use nexum_apdu_ota::config::parse_hex;
use nexum_apdu_ota::transport::pcsc::PcscDeviceManager;
use nexum_apdu_ota::{
    Aid, ApplicationLifecycleManager, CapContainer, ComponentKind, OtaProfile, OtaSession,
    OtaTransport, SmppCollector,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Reader to use (default: first reader with a card)
    #[arg(short, long, global = true)]
    reader: Option<String>,

    /// Ciphering key KIc (hex)
    #[arg(long, global = true)]
    kic: Option<String>,

    /// Checksum key KID (hex)
    #[arg(long, global = true)]
    kid: Option<String>,

    /// TOML profile with reader, keys and install defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print secured user data for an SMSC instead of talking to a card
    #[arg(long, global = true)]
    smpp: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List detected readers
    ListReaders,

    /// Delete a load file or instance
    Delete {
        /// AID to delete (hex)
        aid: String,

        /// Keep instances of a deleted load file
        #[arg(long)]
        object_only: bool,
    },

    /// Load a CAP file
    Load {
        /// Path to the CAP file
        cap: PathBuf,

        /// LOAD block size (default: the largest that fits one packet, at most 188)
        #[arg(long)]
        block_size: Option<usize>,
    },

    /// Install an instance from a loaded CAP file
    Install(InstallArgs),

    /// List load files and their modules
    ListApps,

    /// Run a plaintext APDU script over remote file management
    Rfm {
        /// APDU script (hex)
        apdus: String,

        /// Target the USIM file system instead of the SIM one
        #[arg(long)]
        usim: bool,
    },

    /// Show the components and AIDs of a CAP file
    CapInfo {
        /// Path to the CAP file
        cap: PathBuf,
    },
}

#[derive(Args)]
struct InstallArgs {
    /// Path to the CAP file the package was loaded from
    cap: PathBuf,

    /// Module (applet class) AID (hex)
    #[arg(long)]
    module_aid: String,

    /// Instance AID (hex)
    #[arg(long)]
    instance_aid: String,

    /// Non-volatile memory for the instance (2 bytes hex)
    #[arg(long)]
    nonvolatile_memory_required: Option<String>,

    /// Volatile memory for the instance (2 bytes hex)
    #[arg(long)]
    volatile_memory_for_install: Option<String>,

    /// Register the instance as a toolkit application
    #[arg(long)]
    enable_sim_toolkit: bool,

    /// Toolkit access domain (hex)
    #[arg(long)]
    access_domain: Option<String>,

    /// Toolkit priority level (1 byte hex)
    #[arg(long)]
    priority_level: Option<String>,

    /// Maximum number of timers
    #[arg(long)]
    max_timers: Option<u8>,

    /// Maximum number of BIP channels
    #[arg(long)]
    max_bip_channel: Option<u8>,

    /// Maximum menu entry text length
    #[arg(long)]
    max_menu_entry_text: Option<u8>,

    /// Maximum number of menu entries
    #[arg(long)]
    max_menu_entries: Option<u8>,

    /// Application specific parameters (hex)
    #[arg(long)]
    app_parameters: Option<String>,

    /// TARs of the instance, concatenated (hex, 3 bytes each)
    #[arg(long)]
    tar: Option<String>,
}

impl InstallArgs {
    /// Overlay the flags given on the command line onto the profile
    fn apply(&self, profile: &mut OtaProfile) {
        let install = &mut profile.install;
        if let Some(v) = &self.nonvolatile_memory_required {
            install.nonvolatile_memory_required.clone_from(v);
        }
        if let Some(v) = &self.volatile_memory_for_install {
            install.volatile_memory_for_install.clone_from(v);
        }
        if let Some(v) = &self.access_domain {
            install.access_domain.clone_from(v);
        }
        if let Some(v) = &self.priority_level {
            install.priority_level.clone_from(v);
        }
        if let Some(v) = self.max_timers {
            install.max_timers = v;
        }
        if let Some(v) = self.max_bip_channel {
            install.max_bip_channel = v;
        }
        if let Some(v) = self.max_menu_entry_text {
            install.max_menu_entry_text = v;
        }
        if let Some(v) = self.max_menu_entries {
            install.max_menu_entries = v;
        }
        if let Some(v) = &self.app_parameters {
            install.app_parameters.clone_from(v);
        }
        if self.tar.is_some() {
            install.tar.clone_from(&self.tar);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .init();

    let mut profile = match &cli.config {
        Some(path) => OtaProfile::load(path)?,
        None => OtaProfile::default(),
    };
    if cli.reader.is_some() {
        profile.reader.clone_from(&cli.reader);
    }
    if cli.kic.is_some() {
        profile.kic.clone_from(&cli.kic);
    }
    if cli.kid.is_some() {
        profile.kid.clone_from(&cli.kid);
    }
    if let Commands::Install(args) = &cli.command {
        args.apply(&mut profile);
    }

    // Commands that do not need a card
    match &cli.command {
        Commands::ListReaders => return list_readers(),
        Commands::CapInfo { cap } => return cap_info(cap),
        _ => {}
    }

    let keys = profile.keys()?;
    if cli.smpp {
        let mut lifecycle = ApplicationLifecycleManager::new(SmppCollector::new(keys));
        run(&mut lifecycle, &cli.command, &profile)?;
        for (i, message) in lifecycle.session().messages().iter().enumerate() {
            println!("SMPP message {}: {}", i + 1, hex::encode_upper(message));
        }
        return Ok(());
    }

    let manager = PcscDeviceManager::new()?;
    let transport = match &profile.reader {
        Some(name) => manager.open_reader(name)?,
        None => manager.open_first_with_card()?,
    };
    println!("Using reader: {}", transport.reader_name());

    let mut session = OtaSession::new(transport, keys);
    session.send_terminal_profile()?;

    let mut lifecycle = ApplicationLifecycleManager::new(session);
    run(&mut lifecycle, &cli.command, &profile)
}

fn run<S: OtaTransport>(
    lifecycle: &mut ApplicationLifecycleManager<S>,
    command: &Commands,
    profile: &OtaProfile,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::ListReaders | Commands::CapInfo { .. } => {}

        Commands::Delete { aid, object_only } => {
            let aid = Aid::from_hex(aid)?;
            println!("Deleting {aid}...");
            lifecycle.delete(&aid, !object_only)?;
            println!("Deleted.");
        }

        Commands::Load { cap, block_size } => {
            let load_file = CapContainer::open(cap)?.load_file()?;
            if let Some(block_size) = block_size {
                lifecycle.set_block_size(*block_size);
            }
            let mut callback = |current: usize, total: usize| -> nexum_apdu_ota::Result<()> {
                println!(
                    "Loading block {}/{} ({}%)",
                    current,
                    total,
                    (current * 100) / total
                );
                Ok(())
            };
            let aid = lifecycle.load(&load_file, Some(&mut callback))?;
            println!("Loaded package {aid}.");
        }

        Commands::Install(args) => {
            let package_aid = CapContainer::open(&args.cap)?.package_aid()?;
            let module_aid = Aid::from_hex(&args.module_aid)?;
            let instance_aid = Aid::from_hex(&args.instance_aid)?;
            let params = profile
                .install
                .install_parameters(args.enable_sim_toolkit)?;

            println!("Installing {instance_aid} from package {package_aid}...");
            lifecycle.install(&package_aid, &module_aid, &instance_aid, &params)?;
            println!("Installed.");
        }

        Commands::ListApps => {
            let records = lifecycle.list_applications()?;
            if records.is_empty() {
                println!("No load files found.");
            }
            for record in records {
                println!(
                    "AID: {}, State: {:02X}, Privs: {:02X}",
                    hex::encode_upper(&record.aid),
                    record.lifecycle,
                    record.privileges
                );
                for module in &record.modules {
                    println!("\tInstance AID: {}", hex::encode_upper(module));
                }
            }
        }

        Commands::Rfm { apdus, usim } => {
            let script = parse_hex("apdus", apdus)?;
            let reply = lifecycle.remote_file_management(*usim, &script)?;
            println!(
                "Response: {} ({})",
                hex::encode_upper(&reply.data),
                reply.status
            );
        }
    }
    Ok(())
}

fn list_readers() -> Result<(), Box<dyn std::error::Error>> {
    let readers = PcscDeviceManager::new()?.list_readers()?;
    if readers.is_empty() {
        println!("No readers found.");
        return Ok(());
    }

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        let status = if reader.has_card() {
            "card present"
        } else {
            "no card"
        };
        println!("{}. {} ({})", i + 1, reader.name(), status);
    }
    Ok(())
}

fn cap_info(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let cap = CapContainer::open(path)?;
    println!("Analyzing CAP file: {}", path.display());
    println!("========================================");

    println!("Entries:");
    for entry in cap.entries() {
        println!("  {entry}");
    }

    println!("Components:");
    for kind in ComponentKind::ALL {
        match cap.components().get(kind) {
            Some(data) => println!("  {:<28} {} bytes", kind.file_name(), data.len()),
            None => println!("  {:<28} -", kind.file_name()),
        }
    }

    println!("Package AID: {}", cap.package_aid()?);
    let applets = cap.components().applet_aids()?;
    if applets.is_empty() {
        println!("No applets.");
    }
    for (i, aid) in applets.iter().enumerate() {
        println!("Applet {}: {aid}", i + 1);
    }
    println!("Load file size: {} bytes", cap.load_file()?.len());
    Ok(())
}
