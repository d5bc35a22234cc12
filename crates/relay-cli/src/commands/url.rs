//! `relay url <host>`: print the terminal URL a session would connect to.

use anyhow::{Context, Result};

use relay_client::terminal_url;

pub fn run(origin: &str, host: &str) -> Result<()> {
    let url = terminal_url(origin, host)
        .with_context(|| format!("cannot derive a terminal URL from origin '{origin}'"))?;
    println!("{url}");
    Ok(())
}
