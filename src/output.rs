use pwvault::VaultEntry;
use pwvault::generator;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Prints entries as a table without their secrets.
pub fn print_entries(entries: &[VaultEntry]) {
    if entries.is_empty() {
        println!("No entries found.");
        return;
    }

    let id_width = column_width("ID", entries.iter().map(|e| e.id().to_string().len()));
    let site_width = column_width("Website", entries.iter().map(|e| e.website().len()));
    let user_width = column_width("Username", entries.iter().map(|e| e.username().len()));

    println!(
        "{:>id_width$}  {:<site_width$}  {:<user_width$}  Modified",
        "ID", "Website", "Username"
    );
    println!(
        "{:->id_width$}  {:-<site_width$}  {:-<user_width$}  {:-<16}",
        "", "", "", ""
    );

    for e in entries {
        println!(
            "{:>id_width$}  {:<site_width$}  {:<user_width$}  {}",
            e.id(),
            e.website(),
            e.username(),
            e.modified_at().format(DATE_FORMAT)
        );
    }
}

fn column_width(header: &str, values: impl Iterator<Item = usize>) -> usize {
    values.chain(std::iter::once(header.len())).max().unwrap_or(0)
}

/// Prints one entry. The secret is shown only when `show_secret` is set.
pub fn print_entry(entry: &VaultEntry, show_secret: bool) {
    println!("ID:       {}", entry.id());
    println!("Website:  {}", entry.website());
    println!("Username: {}", entry.username());
    if show_secret {
        println!("Password: {}", entry.secret());
    }
    if !entry.notes().is_empty() {
        println!("Notes:    {}", entry.notes());
    }
    println!("Created:  {}", entry.created_at().format(DATE_FORMAT));
    println!("Modified: {}", entry.modified_at().format(DATE_FORMAT));
}

pub fn print_generated(password: &str) {
    println!("{password}");
    eprintln!("strength: {}/100", generator::score_strength(password));
}

/// Advisory only; weak passphrases are still accepted.
pub fn warn_if_weak(passphrase: &str) {
    if generator::is_weak(passphrase) {
        eprintln!(
            "warning: weak master password (strength {}/100); consider a longer one with mixed character types",
            generator::score_strength(passphrase)
        );
    }
}
