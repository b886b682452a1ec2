//! locator-ctl: command-line interface for the locator daemon.

use anyhow::{Context, Result};

mod cmd;

const DEFAULT_PORT: u16 = 10055;

fn print_usage() {
    println!("Usage: locator-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status           Show node identity, service and peer counts");
    println!("  services         List locally attached services");
    println!("  resolve <name>   Resolve a service, locally or on a peer");
    println!("  peers            List tracked peers and their channel phase");
    println!();
    println!("Options:");
    println!("  --port <port>   Diagnostics API port (default: {})", DEFAULT_PORT);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | []                => cmd::status::cmd_status(port).await,
        ["peers"]                      => cmd::status::cmd_peers(port).await,
        ["services"]                   => cmd::services::cmd_services(port).await,
        ["resolve", name]              => cmd::services::cmd_resolve(port, name).await,
        ["help"] | ["--help"] | ["-h"] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
