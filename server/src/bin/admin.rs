//! Operator entrypoint for credential maintenance. Runs offline against the
//! credential files; a live server picks the changes up through its watcher.

use std::env;
use std::process::ExitCode;

use chrono::Utc;

use pgmcp_server::{admin, config::Config, utils::expiry::parse_expiry};

const USAGE: &str = "\
Usage: pgmcp-admin <command> [options]

Token commands (file from AUTH_TOKEN_FILE):
  add-token [--note <text>] [--expires <Nh|Nd|Nw|Ny|never>] [--database <name>]
  remove-token <id | hash-prefix (>= 8 chars)>
  list-tokens

User commands (file from AUTH_USER_FILE):
  add-user <username> --password <password> [--note <text>]
  update-user <username> [--password <password>] [--note <text>]
  delete-user <username>
  enable-user <username>
  disable-user <username>
  list-users
";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let config = Config::load()?;
    let token_file = &config.auth.token_file;
    let user_file = &config.auth.user_file;
    let now = Utc::now();

    match args.first().map(String::as_str) {
        Some("add-token") => {
            let opts = parse_options(&args[1..])?;
            let expires_at = match opts.get("expires") {
                Some(raw) => parse_expiry(raw, now)?,
                None => None,
            };
            let new = admin::add_token(
                token_file,
                opts.get("note").map(String::as_str).unwrap_or(""),
                expires_at,
                opts.get("database").cloned(),
                now,
            )?;
            println!("Added token {}", new.record.id);
            println!();
            println!("  {}", new.secret);
            println!();
            println!("This secret is shown only once; store it now.");
        }
        Some("remove-token") => {
            let needle = positional(&args, "id or hash prefix")?;
            let removed = admin::remove_token(token_file, &needle)?;
            println!("Removed token {} ({})", removed.id, &removed.hash[..8]);
        }
        Some("list-tokens") => {
            let listings = admin::list_tokens(token_file, now)?;
            if listings.is_empty() {
                println!("No tokens in {}", token_file.display());
                return Ok(());
            }
            for t in listings {
                let expires = t
                    .expires_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".into());
                let status = if t.valid { "valid" } else { "expired" };
                println!(
                    "{}  {}…  created {}  expires {}  [{}]  {}",
                    t.id,
                    t.hash_prefix,
                    t.created_at.to_rfc3339(),
                    expires,
                    status,
                    t.note
                );
            }
        }
        Some("add-user") => {
            let username = positional(&args, "username")?;
            let opts = parse_options(&args[2..])?;
            let password = opts
                .get("password")
                .ok_or_else(|| anyhow::anyhow!("--password is required"))?;
            admin::add_user(
                user_file,
                &username,
                password,
                opts.get("note").map(String::as_str).unwrap_or(""),
                now,
            )?;
            println!("Added user {}", username);
        }
        Some("update-user") => {
            let username = positional(&args, "username")?;
            let opts = parse_options(&args[2..])?;
            if !opts.contains_key("password") && !opts.contains_key("note") {
                return Err(anyhow::anyhow!("nothing to update: pass --password and/or --note"));
            }
            admin::update_user(
                user_file,
                &username,
                opts.get("password").map(String::as_str),
                opts.get("note").map(String::as_str),
            )?;
            println!("Updated user {}", username);
        }
        Some("delete-user") => {
            let username = positional(&args, "username")?;
            admin::delete_user(user_file, &username)?;
            println!("Deleted user {}", username);
        }
        Some("enable-user") => {
            let username = positional(&args, "username")?;
            admin::set_user_enabled(user_file, &username, true)?;
            println!("Enabled user {}", username);
        }
        Some("disable-user") => {
            let username = positional(&args, "username")?;
            admin::set_user_enabled(user_file, &username, false)?;
            println!("Disabled user {}", username);
        }
        Some("list-users") => {
            let listings = admin::list_users(user_file)?;
            if listings.is_empty() {
                println!("No users in {}", user_file.display());
                return Ok(());
            }
            for u in listings {
                let last_login = u
                    .last_login_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".into());
                let status = if u.enabled { "enabled" } else { "disabled" };
                println!(
                    "{}  [{}]  created {}  last login {}  failures {}  {}",
                    u.username,
                    status,
                    u.created_at.to_rfc3339(),
                    last_login,
                    u.failed_attempts,
                    u.note
                );
            }
        }
        _ => {
            eprint!("{}", USAGE);
            return Err(anyhow::anyhow!("unknown or missing command"));
        }
    }
    Ok(())
}

/// Second argument, required.
fn positional(args: &[String], what: &str) -> anyhow::Result<String> {
    args.get(1)
        .filter(|a| !a.starts_with("--"))
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing {}", what))
}

/// `--key value` pairs only; anything else is an error.
fn parse_options(args: &[String]) -> anyhow::Result<std::collections::HashMap<String, String>> {
    let mut options = std::collections::HashMap::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let key = arg
            .strip_prefix("--")
            .ok_or_else(|| anyhow::anyhow!("unexpected argument '{}'", arg))?;
        let value = iter
            .next()
            .ok_or_else(|| anyhow::anyhow!("--{} requires a value", key))?;
        options.insert(key.to_string(), value.clone());
    }
    Ok(options)
}
