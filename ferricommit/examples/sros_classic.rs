//! Nokia SR OS Classic transaction example
//!
//! Pushes a list of Classic CLI commands as one transaction. The device
//! saves a rollback checkpoint first; any failing command reverts the whole
//! change. With `--dry-run` the commands are applied, diffed, and reverted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example sros_classic -- --host pe1 --user admin --password admin \
//!     --dry-run --diff \
//!     'configure system location "rack 4"' \
//!     'configure system contact "noc@example.net"'
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use ferricommit::{
    CancellationToken, CommandChannel, Mode, SessionBuilder, TransactionConfig,
    TransactionEngine, TransactionRequest,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.commands.is_empty() {
        eprintln!("Error: no commands given");
        Args::print_help();
        std::process::exit(1);
    }

    println!("=== Ferricommit SR OS Classic Example ===\n");
    println!("Connecting to {}:{}...", args.host, args.port);

    let mut builder = SessionBuilder::new(&args.host)
        .port(args.port)
        .username(&args.user)
        .timeout(Duration::from_secs(args.timeout))
        .danger_disable_host_key_verification();

    if let Some(password) = &args.password {
        builder = builder.password(password);
    } else if let Some(key_path) = &args.key {
        builder = builder.private_key(key_path);
    } else {
        eprintln!("Error: Must provide either --password or --key");
        std::process::exit(1);
    }

    let mut session = builder.open().await?;
    println!("Connected! Prompt: {}\n", session.last_prompt());

    let mode = if args.light { Mode::Light } else { Mode::Classic };
    let config = TransactionConfig::default()
        .with_mode(mode)
        .with_retention_count(args.retention)
        .with_command_timeout(Duration::from_secs(args.timeout));

    let request = TransactionRequest::new(args.commands.iter().cloned())
        .with_diff(args.diff)
        .with_dry_run(args.dry_run);

    // Ctrl-C rolls the transaction back instead of killing it mid-apply
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let result = {
        let mut engine = TransactionEngine::from_config(&mut session, config)?.with_cancel(cancel);
        engine.execute(&request).await
    };

    match result {
        Ok(report) => {
            println!("Outcome: {:?}", report.outcome);
            println!("Changed: {}", report.changed());
            if let Some(checkpoint) = &report.checkpoint {
                println!("Checkpoint: {}", checkpoint.name);
            }
            if let Some(diff) = report.diff() {
                println!("\n--- Diff ---\n{}", diff);
            }
            for warning in &report.warnings {
                println!("Warning: {}", warning);
            }
        }
        Err(e) => {
            eprintln!("Transaction failed ({:?}): {}", e.severity(), e);
            eprintln!("Outcome: {:?}, changed: {}", e.outcome, e.changed);
            if let Some(command) = &e.offending_command {
                eprintln!("Offending command: {}", command);
            }
            for warning in &e.warnings {
                eprintln!("Warning: {}", warning);
            }
        }
    }

    session.close().await?;
    println!("\nDisconnected.");
    Ok(())
}

struct Args {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    key: Option<PathBuf>,
    timeout: u64,
    retention: usize,
    diff: bool,
    dry_run: bool,
    light: bool,
    commands: Vec<String>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut host = "localhost".to_string();
        let mut port = 22u16;
        let mut user = env::var("USER").unwrap_or_else(|_| "admin".to_string());
        let mut password = None;
        let mut key = None;
        let mut timeout = 30u64;
        let mut retention = 1usize;
        let mut diff = false;
        let mut dry_run = false;
        let mut light = false;
        let mut commands = Vec::new();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    i += 1;
                    if i < args.len() {
                        host = args[i].clone();
                    }
                }
                "--port" | "-p" => {
                    i += 1;
                    if i < args.len() {
                        port = args[i].parse().unwrap_or(22);
                    }
                }
                "--user" | "-u" => {
                    i += 1;
                    if i < args.len() {
                        user = args[i].clone();
                    }
                }
                "--password" | "-P" => {
                    i += 1;
                    if i < args.len() {
                        password = Some(args[i].clone());
                    }
                }
                "--key" | "-k" => {
                    i += 1;
                    if i < args.len() {
                        key = Some(PathBuf::from(&args[i]));
                    }
                }
                "--timeout" | "-t" => {
                    i += 1;
                    if i < args.len() {
                        timeout = args[i].parse().unwrap_or(30);
                    }
                }
                "--retention" | "-r" => {
                    i += 1;
                    if i < args.len() {
                        retention = args[i].parse().unwrap_or(1);
                    }
                }
                "--diff" | "-d" => diff = true,
                "--dry-run" | "-n" => dry_run = true,
                "--light" => light = true,
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                other => commands.push(other.to_string()),
            }
            i += 1;
        }

        Self {
            host,
            port,
            user,
            password,
            key,
            timeout,
            retention,
            diff,
            dry_run,
            light,
            commands,
        }
    }

    fn print_help() {
        println!(
            r#"ferricommit SR OS Classic example

Applies Classic CLI commands as one checkpoint-guarded transaction.

USAGE:
    cargo run --example sros_classic -- [OPTIONS] <COMMAND>...

OPTIONS:
    -h, --host <HOST>        Target host [default: localhost]
    -p, --port <PORT>        SSH port [default: 22]
    -u, --user <USER>        Username [default: $USER]
    -P, --password <PASS>    Password for authentication
    -k, --key <PATH>         Path to SSH private key
    -t, --timeout <SECS>     Connection and per-command timeout [default: 30]
    -r, --retention <N>      Checkpoints to keep after cleanup [default: 1]
    -d, --diff               Print the device diff
    -n, --dry-run            Apply, diff, then revert
    --light                  No checkpoints; prompt-marker change detection only
    --help                   Print this help message

EXAMPLES:
    # Preview a change
    cargo run --example sros_classic -- --host pe1 --password admin -n -d \
        'configure system location "rack 4"'

    # Debug logging
    RUST_LOG=debug cargo run --example sros_classic -- --host pe1 --password admin \
        'configure system location "rack 4"'
"#
        );
    }
}
