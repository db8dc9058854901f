use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

pub const PASSWORD_ENV: &str = "PWVAULT_PASSWORD";
pub const NEW_PASSWORD_ENV: &str = "PWVAULT_NEW_PASSWORD";

/// Reads the master passphrase.
pub fn read_password() -> Result<Zeroizing<String>> {
    //  Environment Variable
    //  PWVAULT_PASSWORD="supersecret" pwvault list
    if let Some(pw) = from_env(PASSWORD_ENV) {
        return Ok(pw);
    }

    //  stdin (Pipeline)
    //  echo "supersecret" | pwvault list
    if !io::stdin().is_terminal() {
        let pw = read_line()?;
        if !pw.is_empty() {
            return Ok(pw);
        }
    }

    if io::stdin().is_terminal() {
        let pw = Zeroizing::new(rpassword::prompt_password("Master password: ")?);
        if !pw.is_empty() {
            return Ok(pw);
        }
    }

    bail!("no master password provided")
}

/// Reads a new passphrase: from `env_var` if set, otherwise twice from stdin
/// or the terminal.
pub fn read_new_password_with_confirmation(env_var: &str) -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env(env_var) {
        return Ok(pw);
    }

    let (pw1, pw2) = if io::stdin().is_terminal() {
        (
            Zeroizing::new(rpassword::prompt_password("New master password: ")?),
            Zeroizing::new(rpassword::prompt_password("Confirm master password: ")?),
        )
    } else {
        (read_line()?, read_line()?)
    };

    if pw1.is_empty() {
        bail!("password cannot be empty");
    }

    if pw1 != pw2 {
        bail!("passwords do not match");
    }

    Ok(pw1)
}

/// Reads an entry secret without echo on a terminal.
pub fn read_secret(prompt: &str) -> Result<Zeroizing<String>> {
    if io::stdin().is_terminal() {
        Ok(Zeroizing::new(rpassword::prompt_password(prompt)?))
    } else {
        read_line()
    }
}

fn from_env(var: &str) -> Option<Zeroizing<String>> {
    std::env::var(var)
        .ok()
        .filter(|pw| !pw.is_empty())
        .map(Zeroizing::new)
}

fn read_line() -> Result<Zeroizing<String>> {
    let mut buf = Zeroizing::new(String::new());
    io::stdin().lock().read_line(&mut buf)?;
    trim_newline(&mut buf);
    Ok(buf)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
