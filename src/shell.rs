//! Interactive session over an unlocked vault.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use pwvault::Vault;
use pwvault::generator::{self, CharClasses};
use tracing::{info, warn};

use crate::{auth, clipboard, output};

pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const WATCHDOG_POLL: Duration = Duration::from_secs(1);
const DEFAULT_GENERATED_LENGTH: usize = 16;

type SharedVault = Arc<Mutex<Vault>>;
type PendingClears = Arc<Mutex<Vec<clipboard::ScheduledClear>>>;

const HELP: &str = "\
commands:
  list                  list all entries
  search <term>         search website, username and notes
  get <id> [copy]       show an entry, or copy its password
  add                   add an entry
  update <id>           change an entry
  delete <id>           delete an entry
  generate [length]     generate a random password
  passwd                change the master password
  help                  show this help
  exit                  lock the vault and quit";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    List,
    Search(String),
    Get { id: i64, copy: bool },
    Add,
    Update(i64),
    Delete(i64),
    Generate(usize),
    Passwd,
    Help,
    Exit,
    Empty,
}

impl Command {
    fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(Command::Empty);
        };
        let rest: Vec<&str> = words.collect();

        let id = |rest: &[&str]| -> Result<i64> {
            rest.first()
                .ok_or_else(|| anyhow!("{name}: missing entry id"))?
                .parse()
                .with_context(|| format!("{name}: invalid entry id"))
        };

        Ok(match name {
            "list" | "ls" => Command::List,
            "search" | "find" => Command::Search(rest.join(" ")),
            "get" | "show" => Command::Get {
                id: id(&rest)?,
                copy: rest.get(1).is_some_and(|w| *w == "copy"),
            },
            "add" => Command::Add,
            "update" | "edit" => Command::Update(id(&rest)?),
            "delete" | "rm" => Command::Delete(id(&rest)?),
            "generate" | "gen" => Command::Generate(match rest.first() {
                Some(n) => n.parse().context("generate: invalid length")?,
                None => DEFAULT_GENERATED_LENGTH,
            }),
            "passwd" => Command::Passwd,
            "help" | "?" => Command::Help,
            "exit" | "quit" | "lock" => Command::Exit,
            other => bail!("unknown command '{other}', try 'help'"),
        })
    }
}

/// Runs the shell until `exit`, end of input or inactivity timeout. The vault
/// is locked on every way out.
pub fn run(vault: Vault) -> Result<()> {
    let vault: SharedVault = Arc::new(Mutex::new(vault));
    let activity = Arc::new(Mutex::new(Instant::now()));
    let stop = Arc::new(AtomicBool::new(false));
    let clears: PendingClears = Arc::new(Mutex::new(Vec::new()));

    install_interrupt_handler(Arc::clone(&vault), Arc::clone(&clears))?;
    let watchdog = spawn_watchdog(
        Arc::clone(&vault),
        Arc::clone(&activity),
        Arc::clone(&stop),
        INACTIVITY_TIMEOUT,
    );

    println!("Vault unlocked. Type 'help' for commands.");
    let result = repl(&vault, &activity, &clears);

    stop.store(true, Ordering::Relaxed);
    if watchdog.join().is_err() {
        warn!("watchdog thread panicked");
    }
    clear_clipboard(&clears);
    locked(&vault)?.logout().context("failed to lock vault")?;
    println!("Vault locked.");

    result
}

fn repl(vault: &SharedVault, activity: &Mutex<Instant>, clears: &PendingClears) -> Result<()> {
    loop {
        print!("pwvault> ");
        io::stdout().flush()?;

        let Some(line) = read_line()? else {
            return Ok(());
        };
        touch(activity)?;

        if !locked(vault)?.is_unlocked() {
            println!("Session timed out.");
            return Ok(());
        }

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e:#}");
                continue;
            }
        };
        if command == Command::Exit {
            return Ok(());
        }

        if let Err(e) = execute(vault, activity, clears, command) {
            eprintln!("error: {e:#}");
        }
    }
}

/// Executes one command. Input is gathered before the vault mutex is taken
/// so the watchdog can lock the vault while a prompt is waiting.
fn execute(
    vault: &SharedVault,
    activity: &Mutex<Instant>,
    clears: &PendingClears,
    command: Command,
) -> Result<()> {
    match command {
        Command::List => output::print_entries(&locked(vault)?.list_entries()?),
        Command::Search(term) => output::print_entries(&locked(vault)?.search_entries(&term)?),
        Command::Get { id, copy } => {
            let entry = locked(vault)?.get_entry(id)?;
            if copy {
                let clear = clipboard::copy_with_timeout(entry.secret(), clipboard::CLEAR_AFTER)?;
                let mut pending = clears.lock().map_err(|_| anyhow!("clipboard state poisoned"))?;
                pending.retain(|c| !c.is_finished());
                pending.push(clear);
                drop(pending);
                output::print_entry(&entry, false);
                println!(
                    "Password copied; clipboard clears in {} seconds.",
                    clipboard::CLEAR_AFTER.as_secs()
                );
            } else {
                output::print_entry(&entry, true);
            }
        }
        Command::Add => {
            let website = prompt("Website: ")?;
            let username = prompt("Username: ")?;
            let secret = auth::read_secret("Password (blank to generate): ")?;
            let notes = prompt("Notes: ")?;
            touch(activity)?;

            let generated;
            let secret = if secret.is_empty() {
                generated = generator::generate(DEFAULT_GENERATED_LENGTH, CharClasses::default());
                println!("Generated password: {generated}");
                generated.as_str()
            } else {
                secret.as_str()
            };
            let id = locked(vault)?.add_entry(&website, &username, secret, &notes)?;
            println!("Added entry {id}.");
        }
        Command::Update(id) => {
            let current = locked(vault)?.get_entry(id)?;
            let website = prompt_or(&format!("Website [{}]: ", current.website()), current.website())?;
            let username = prompt_or(&format!("Username [{}]: ", current.username()), current.username())?;
            let secret = auth::read_secret("Password (blank to keep): ")?;
            let notes = prompt_or("Notes (blank to keep): ", current.notes())?;
            touch(activity)?;

            let secret = if secret.is_empty() { current.secret() } else { secret.as_str() };
            locked(vault)?.update_entry(id, &website, &username, secret, &notes)?;
            println!("Updated entry {id}.");
        }
        Command::Delete(id) => {
            let answer = prompt(&format!("Delete entry {id}? [y/N] "))?;
            if answer.eq_ignore_ascii_case("y") {
                locked(vault)?.delete_entry(id)?;
                println!("Deleted entry {id}.");
            }
        }
        Command::Generate(length) => {
            output::print_generated(&generator::generate(length, CharClasses::default()));
        }
        Command::Passwd => {
            let old = auth::read_secret("Current master password: ")?;
            let new = auth::read_new_password_with_confirmation(auth::NEW_PASSWORD_ENV)?;
            output::warn_if_weak(&new);
            touch(activity)?;

            locked(vault)?.change_master_password(&old, &new)?;
            println!("Master password changed.");
        }
        Command::Help => println!("{HELP}"),
        Command::Exit | Command::Empty => {}
    }
    Ok(())
}

fn spawn_watchdog(
    vault: SharedVault,
    activity: Arc<Mutex<Instant>>,
    stop: Arc<AtomicBool>,
    timeout: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            thread::sleep(WATCHDOG_POLL.min(timeout));

            let idle = match activity.lock() {
                Ok(last) => last.elapsed(),
                Err(_) => return,
            };
            if idle < timeout {
                continue;
            }

            let Ok(mut vault) = vault.lock() else { return };
            if vault.is_unlocked() {
                match vault.logout() {
                    Ok(()) => {
                        info!(idle_secs = idle.as_secs(), "vault locked after inactivity");
                        eprintln!("\nVault locked after {} minutes of inactivity.", timeout.as_secs() / 60);
                    }
                    Err(e) => warn!(error = %e, "failed to lock vault after inactivity"),
                }
            }
            return;
        }
    })
}

/// Clears every copied secret still on the clipboard.
fn clear_clipboard(clears: &PendingClears) {
    let pending = match clears.lock() {
        Ok(mut pending) => std::mem::take(&mut *pending),
        Err(_) => return,
    };
    for clear in pending {
        if let Err(e) = clear.clear_now() {
            warn!(error = %e, "failed to clear clipboard");
        }
    }
}

fn install_interrupt_handler(vault: SharedVault, clears: PendingClears) -> Result<()> {
    ctrlc::set_handler(move || {
        clear_clipboard(&clears);
        if let Ok(mut vault) = vault.lock() {
            if let Err(e) = vault.logout() {
                eprintln!("\nfailed to lock vault: {e}");
                std::process::exit(1);
            }
        }
        eprintln!("\nVault locked.");
        std::process::exit(130);
    })
    .context("failed to install Ctrl-C handler")
}

fn locked(vault: &SharedVault) -> Result<MutexGuard<'_, Vault>> {
    vault.lock().map_err(|_| anyhow!("vault state poisoned"))
}

fn touch(activity: &Mutex<Instant>) -> Result<()> {
    *activity.lock().map_err(|_| anyhow!("activity clock poisoned"))? = Instant::now();
    Ok(())
}

fn read_line() -> Result<Option<String>> {
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    Ok(read_line()?.unwrap_or_default())
}

fn prompt_or(label: &str, current: &str) -> Result<String> {
    let answer = prompt(label)?;
    Ok(if answer.is_empty() { current.to_string() } else { answer })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(Command::parse("").unwrap(), Command::Empty);
        assert_eq!(Command::parse("list").unwrap(), Command::List);
        assert_eq!(
            Command::parse("search git hub").unwrap(),
            Command::Search("git hub".into())
        );
        assert_eq!(
            Command::parse("get 7 copy").unwrap(),
            Command::Get { id: 7, copy: true }
        );
        assert_eq!(
            Command::parse("get 7").unwrap(),
            Command::Get { id: 7, copy: false }
        );
        assert_eq!(Command::parse("rm 3").unwrap(), Command::Delete(3));
        assert_eq!(
            Command::parse("generate").unwrap(),
            Command::Generate(DEFAULT_GENERATED_LENGTH)
        );
        assert_eq!(Command::parse("gen 32").unwrap(), Command::Generate(32));
        assert_eq!(Command::parse("quit").unwrap(), Command::Exit);
    }

    #[test]
    fn leaving_the_shell_clears_pending_copies() {
        let ran = Arc::new(AtomicBool::new(false));
        let set = Arc::clone(&ran);
        let clears: PendingClears = Arc::new(Mutex::new(vec![clipboard::ScheduledClear::spawn(
            Duration::from_secs(3600),
            move || set.store(true, Ordering::SeqCst),
        )]));

        clear_clipboard(&clears);

        assert!(ran.load(Ordering::SeqCst));
        assert!(clears.lock().unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Command::parse("get").is_err());
        assert!(Command::parse("get abc").is_err());
        assert!(Command::parse("frobnicate").is_err());
    }
}
