use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pwvault::generator::{self, CharClasses};
use pwvault::{KdfParams, Vault, VaultPaths, default_paths};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

mod auth;
mod clipboard;
mod output;
mod shell;

const DEFAULT_GENERATED_LENGTH: usize = 16;

#[derive(Debug, clap::Args)]
struct KdfArgs {
    /// PBKDF2 iterations for the login and entry keys (default: 100000)
    #[arg(long)]
    iterations: Option<u32>,

    /// PBKDF2 iterations for the vault file key (default: 150000)
    #[arg(long = "file-iterations")]
    file_iterations: Option<u32>,
}

impl KdfArgs {
    fn to_kdf_params(&self) -> Result<KdfParams> {
        let default = KdfParams::default();

        Ok(KdfParams::new(
            self.iterations.unwrap_or(default.iterations()),
            self.file_iterations.unwrap_or(default.file_iterations()),
        )?)
    }
}

#[derive(Debug, clap::Args)]
struct ClassArgs {
    /// Leave out lowercase letters
    #[arg(long)]
    no_lower: bool,

    /// Leave out uppercase letters
    #[arg(long)]
    no_upper: bool,

    /// Leave out digits
    #[arg(long)]
    no_digits: bool,

    /// Leave out symbols
    #[arg(long)]
    no_symbols: bool,
}

impl ClassArgs {
    fn classes(&self) -> CharClasses {
        CharClasses {
            lower: !self.no_lower,
            upper: !self.no_upper,
            digits: !self.no_digits,
            symbols: !self.no_symbols,
        }
    }
}

fn resolve_paths(dir: Option<PathBuf>) -> Result<VaultPaths> {
    match dir {
        Some(d) => Ok(VaultPaths::in_dir(d)),
        None => Ok(default_paths()?),
    }
}

#[derive(Debug, Parser)]
#[command(name = "pwvault")]
#[command(version, about = "Local, offline password vault with an encrypted at-rest store.")]
struct Cli {
    /// Directory holding the vault files
    #[arg(long, global = true, value_name = "PATH", env = "PWVAULT_DIR")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates a new vault protected by a master password
    Init {
        #[command(flatten)]
        kdf: KdfArgs,
    },

    /// Adds an entry
    #[command(arg_required_else_help = true)]
    Add {
        website: String,
        username: String,

        /// Entry password; prompted for when omitted
        #[arg(short, long, conflicts_with = "generate")]
        password: Option<String>,

        /// Generate a random password for the entry
        #[arg(short, long)]
        generate: bool,

        /// Length of a generated password
        #[arg(long, default_value_t = DEFAULT_GENERATED_LENGTH)]
        length: usize,

        #[arg(short, long, default_value = "")]
        notes: String,
    },

    /// Shows an entry including its password
    #[command(arg_required_else_help = true)]
    Get {
        id: i64,

        /// Copy the password to the clipboard instead of printing it
        #[arg(short, long)]
        copy: bool,
    },

    /// Changes fields of an entry
    #[command(arg_required_else_help = true)]
    Update {
        id: i64,

        #[arg(long)]
        website: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(short, long)]
        password: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Removes an entry
    #[command(arg_required_else_help = true)]
    Remove { id: i64 },

    /// Lists all entries
    List,

    /// Searches website, username and notes
    #[command(arg_required_else_help = true)]
    Search { term: String },

    /// Changes the master password
    Passwd,

    /// Writes a copy of the vault store to a file
    #[command(arg_required_else_help = true)]
    Export {
        dest: PathBuf,

        /// Copy the encrypted vault file without unlocking
        #[arg(long)]
        encrypted: bool,
    },

    /// Replaces the vault store with an exported copy
    #[command(arg_required_else_help = true)]
    Import { src: PathBuf },

    /// Prints a random password
    Generate {
        #[arg(short, long, default_value_t = DEFAULT_GENERATED_LENGTH)]
        length: usize,

        #[command(flatten)]
        classes: ClassArgs,
    },

    /// Opens an interactive session
    Shell,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pwvault=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn unlock(paths: VaultPaths) -> Result<(Vault, Zeroizing<String>)> {
    let mut vault = Vault::new(paths);
    if !vault.is_initialized() {
        bail!(
            "no vault found in {}; run `pwvault init` first",
            vault.paths().dir().display()
        );
    }

    let password = auth::read_password()?;
    vault.login(&password).context("could not unlock vault")?;
    Ok((vault, password))
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Cli::parse();
    let paths = resolve_paths(args.dir)?;

    match args.command {
        Commands::Generate { length, classes } => {
            output::print_generated(&generator::generate(length, classes.classes()));
        }
        Commands::Init { kdf } => {
            let mut vault = Vault::with_kdf(paths, kdf.to_kdf_params()?);
            if vault.is_initialized() {
                bail!("vault already exists in {}", vault.paths().dir().display());
            }

            let password = auth::read_new_password_with_confirmation(auth::PASSWORD_ENV)?;
            output::warn_if_weak(&password);
            vault.setup_master_password(&password)?;
            vault.logout().context("failed to lock vault")?;
            println!("vault initialized in {}", vault.paths().dir().display());
        }
        Commands::Export {
            dest,
            encrypted: true,
        } => {
            let vault = Vault::new(paths);
            vault.export_vault(&dest)?;
            println!("encrypted vault exported to {}", dest.display());
        }
        Commands::Shell => {
            let (vault, _) = unlock(paths)?;
            shell::run(vault)?;
        }
        command => {
            let (mut vault, password) = unlock(paths)?;
            run(&mut vault, &password, command)?;
            vault.logout().context("failed to lock vault")?;
        }
    }

    Ok(())
}

fn run(vault: &mut Vault, password: &str, command: Commands) -> Result<()> {
    match command {
        Commands::Add {
            website,
            username,
            password: secret,
            generate,
            length,
            notes,
        } => {
            let secret = match secret {
                Some(s) => Zeroizing::new(s),
                None if generate => {
                    let generated = generator::generate(length, CharClasses::default());
                    println!("generated password: {generated}");
                    Zeroizing::new(generated)
                }
                None => auth::read_secret("Entry password: ")?,
            };
            let id = vault.add_entry(&website, &username, &secret, &notes)?;
            println!("added entry {id}");
        }
        Commands::Get { id, copy } => {
            let entry = vault.get_entry(id)?;
            if copy {
                let clearer = clipboard::copy_with_timeout(entry.secret(), clipboard::CLEAR_AFTER)?;
                output::print_entry(&entry, false);
                vault.logout().context("failed to lock vault")?;
                println!(
                    "password copied; clipboard clears in {} seconds",
                    clipboard::CLEAR_AFTER.as_secs()
                );
                clearer.wait()?;
            } else {
                output::print_entry(&entry, true);
            }
        }
        Commands::Update {
            id,
            website,
            username,
            password: secret,
            notes,
        } => {
            let current = vault.get_entry(id)?;
            vault.update_entry(
                id,
                website.as_deref().unwrap_or(current.website()),
                username.as_deref().unwrap_or(current.username()),
                secret.as_deref().unwrap_or(current.secret()),
                notes.as_deref().unwrap_or(current.notes()),
            )?;
            println!("entry {id} updated");
        }
        Commands::Remove { id } => {
            vault.delete_entry(id)?;
            println!("entry {id} removed");
        }
        Commands::List => output::print_entries(&vault.list_entries()?),
        Commands::Search { term } => output::print_entries(&vault.search_entries(&term)?),
        Commands::Passwd => {
            let new = auth::read_new_password_with_confirmation(auth::NEW_PASSWORD_ENV)?;
            output::warn_if_weak(&new);
            vault.change_master_password(password, &new)?;
            println!("master password changed");
        }
        Commands::Export { dest, .. } => {
            vault.export_vault(&dest)?;
            println!("vault exported to {}", dest.display());
        }
        Commands::Import { src } => {
            let entries = vault
                .import_vault(&src)
                .with_context(|| format!("failed to import {}", src.display()))?;
            println!("imported {entries} entries");
        }
        Commands::Init { .. } | Commands::Generate { .. } | Commands::Shell => {
            bail!("command does not operate on an unlocked vault")
        }
    }
    Ok(())
}
