//! Winemason CLI
//!
//! One subcommand per library operation; flags map 1:1 to the library
//! function parameters.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use winemason_lib::{
    current_username, machine, HttpDownloader, Machine, RegWriteType, Registry, SystemShell,
    SystemUsers, WineArch, WineCache, WinePrefix,
};

#[derive(Parser)]
#[command(name = "winemason")]
#[command(version)]
#[command(about = "Provision and configure per-user wine prefixes")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a fresh wine machine
    CreateMachine {
        /// Prefix path or bare name under the user's home
        #[arg(long, default_value = ".wine")]
        prefix: String,
        /// win32 or win64
        #[arg(long, default_value = "win32")]
        arch: String,
        /// Owning user (defaults to the invoking user)
        #[arg(long)]
        user: Option<String>,
        /// Delete an existing machine at the same path first
        #[arg(long)]
        overwrite: bool,
    },
    /// Delete a wine machine
    RemoveMachine {
        #[arg(long, default_value = ".wine")]
        prefix: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Pin the reported windows version (winetricks token, e.g. win7)
    SetWindowsVersion {
        #[arg(long, default_value = ".wine")]
        prefix: String,
        #[arg(long, default_value = "win7")]
        version: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Turn off wine's GUI crash dialogs
    DisableCrashDialogs {
        #[arg(long, default_value = ".wine")]
        prefix: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Hand the prefix tree back to its owning user
    FixPermissions {
        #[arg(long, default_value = ".wine")]
        prefix: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Read a registry value from the prefix
    RegRead {
        #[arg(long, default_value = ".wine")]
        prefix: String,
        #[arg(long)]
        user: Option<String>,
        /// Registry key, e.g. HKEY_CURRENT_USER\Software\Wine
        key: String,
        /// Value name within the key
        value: String,
    },
    /// Write a registry value into the prefix
    RegWrite {
        #[arg(long, default_value = ".wine")]
        prefix: String,
        #[arg(long)]
        user: Option<String>,
        /// Value type (REG_SZ, REG_EXPAND_SZ, ...) or auto to preserve the
        /// existing one
        #[arg(long = "type", default_value = "auto")]
        value_type: String,
        key: String,
        value: String,
        data: String,
    },
    /// Prepend a segment to the prefix's PATH registry value
    PrependPath {
        #[arg(long, default_value = ".wine")]
        prefix: String,
        #[arg(long)]
        user: Option<String>,
        /// Windows-style path segment, e.g. C:\Program Files\PortableGit
        segment: String,
    },
    /// Print the per-user download cache directory
    CacheDir {
        #[arg(long)]
        user: Option<String>,
    },
    /// Download an artifact into the per-user cache
    CacheStore {
        #[arg(long)]
        user: Option<String>,
        /// Filename inside the cache directory
        filename: String,
        /// Download URL
        url: String,
        /// Backup URL, tried exactly once when the primary fails
        #[arg(long)]
        backup_url: Option<String>,
    },
    /// Remove an artifact from the per-user cache
    CacheRemove {
        #[arg(long)]
        user: Option<String>,
        filename: String,
    },
}

fn resolve_user(user: Option<String>) -> Result<String> {
    match user {
        Some(user) => Ok(user),
        None => current_username().context("no username given and $USER is unset"),
    }
}

fn run(command: Command) -> Result<()> {
    let shell = SystemShell::new();
    let users = SystemUsers::new();

    match command {
        Command::CreateMachine {
            prefix,
            arch,
            user,
            overwrite,
        } => {
            machine::require_host_tools()?;
            let user = resolve_user(user)?;
            let machine = Machine::new(&shell, &users);
            let prefix = machine.create(&prefix, &arch, &user, overwrite)?;
            println!("created wine machine at {}", prefix);
        }
        Command::RemoveMachine { prefix, user } => {
            let user = resolve_user(user)?;
            Machine::new(&shell, &users).remove(&prefix, &user)?;
        }
        Command::SetWindowsVersion {
            prefix,
            version,
            user,
        } => {
            machine::require_host_tools()?;
            let user = resolve_user(user)?;
            Machine::new(&shell, &users).set_windows_version(&prefix, &version, &user)?;
        }
        Command::DisableCrashDialogs { prefix, user } => {
            machine::require_host_tools()?;
            let user = resolve_user(user)?;
            Machine::new(&shell, &users).disable_crash_dialogs(&prefix, &user)?;
        }
        Command::FixPermissions { prefix, user } => {
            let user = resolve_user(user)?;
            let prefix = WinePrefix::resolve(&prefix, &user, &users)?;
            Machine::new(&shell, &users).fix_permissions(&prefix, &user)?;
        }
        Command::RegRead {
            prefix,
            user,
            key,
            value,
        } => {
            let user = resolve_user(user)?;
            let prefix = WinePrefix::resolve(&prefix, &user, &users)?;
            let arch = WineArch::from_prefix(&prefix)?;
            let registry = Registry::new(&shell, &prefix, arch, &user);
            let (value_type, data) = registry.read(&key, &value)?;
            println!("{}\t{}", value_type.as_str(), data);
        }
        Command::RegWrite {
            prefix,
            user,
            value_type,
            key,
            value,
            data,
        } => {
            let user = resolve_user(user)?;
            let prefix = WinePrefix::resolve(&prefix, &user, &users)?;
            let arch = WineArch::from_prefix(&prefix)?;
            let registry = Registry::new(&shell, &prefix, arch, &user);
            let write_type = if value_type.eq_ignore_ascii_case("auto") {
                RegWriteType::Auto
            } else {
                RegWriteType::Explicit(value_type.parse()?)
            };
            registry.write(&key, &value, &data, write_type)?;
        }
        Command::PrependPath {
            prefix,
            user,
            segment,
        } => {
            let user = resolve_user(user)?;
            let prefix = WinePrefix::resolve(&prefix, &user, &users)?;
            let arch = WineArch::from_prefix(&prefix)?;
            let registry = Registry::new(&shell, &prefix, arch, &user);
            if registry.prepend_to_path(&segment)? {
                println!("prepended {}", segment);
            } else {
                println!("{} already present", segment);
            }
        }
        Command::CacheDir { user } => {
            let user = resolve_user(user)?;
            let cache = WineCache::new(&shell, &users);
            println!("{}", cache.directory_for(&user)?.display());
        }
        Command::CacheStore {
            user,
            filename,
            url,
            backup_url,
        } => {
            let user = resolve_user(user)?;
            let cache = WineCache::new(&shell, &users);
            let downloader = HttpDownloader::new()?;
            let stored = match cache.store(&user, &filename, &url, &downloader) {
                Ok(path) => path,
                Err(error) => match backup_url {
                    Some(backup) => {
                        warn!("download from {} failed ({}), trying backup", url, error);
                        cache.store(&user, &filename, &backup, &downloader)?
                    }
                    None => return Err(error.into()),
                },
            };
            println!("stored {}", stored.display());
        }
        Command::CacheRemove { user, filename } => {
            let user = resolve_user(user)?;
            WineCache::new(&shell, &users).remove(&user, &filename)?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(format!("winemason_lib={0},winemason={0}", log_level))
        .init();

    if let Err(error) = run(cli.command) {
        eprintln!("error: {:#}", error);
        std::process::exit(1);
    }
}
