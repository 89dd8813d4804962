//! Command-line client for Microsoft 365 Copilot chat.
//!
//! # Usage
//!
//! ```bash
//! # Sign in with Microsoft Entra (device flow)
//! m365chat login
//!
//! # One-shot query
//! m365chat "What meetings do I have today?"
//!
//! # Stream the response as it is generated
//! m365chat --stream "Summarize my recent emails from John"
//!
//! # Sign out and clear cached tokens
//! m365chat logout
//! ```
//!
//! Exit codes: 0 success, 1 authentication error, 2 permission denied,
//! 3 network error, 4 invalid input, 5 conversation/general error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use m365chat::auth::{CachedTokenSupplier, CredentialsStore, TokenSupplier, device_flow};
use m365chat::oneshot::run_query;
use m365chat::{Copilot, Error};

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let Some(command) = args.first() else {
        println!("M365 Copilot Chat CLI");
        println!();
        println!("Run 'm365chat help' for usage information.");
        return report(&Error::validation("no query given"));
    };

    match command.as_str() {
        "login" => login().await,
        "logout" => logout(),
        "help" | "--help" | "-h" => {
            print_help();
            0
        }
        _ => one_shot(&args).await,
    }
}

/// Write the error once to stderr and return its exit code.
fn report(err: &Error) -> i32 {
    eprintln!("Error: {err}");
    err.exit_code()
}

/// Install a Ctrl+C handler that flips the returned flag.
fn interrupt_flag() -> Arc<AtomicBool> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = Arc::clone(&interrupted);
    let _ = ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::SeqCst);
    });
    interrupted
}

async fn login() -> i32 {
    let store = match CredentialsStore::new() {
        Ok(store) => store,
        Err(err) => return report(&err),
    };
    let cancel = interrupt_flag();
    match device_flow::login(&store, &cancel).await {
        Ok(_) => 0,
        Err(err) => report(&err),
    }
}

fn logout() -> i32 {
    let store = match CredentialsStore::new() {
        Ok(store) => store,
        Err(err) => return report(&err),
    };
    match device_flow::logout(&store) {
        Ok(()) => 0,
        Err(err) => report(&err),
    }
}

async fn one_shot(args: &[String]) -> i32 {
    let mut streaming = false;
    let mut query_args: Vec<&str> = Vec::new();
    for arg in args {
        if arg == "--stream" || arg == "-s" {
            streaming = true;
        } else {
            query_args.push(arg);
        }
    }
    let query = query_args.join(" ");

    let supplier = match CachedTokenSupplier::new() {
        Ok(supplier) => supplier,
        Err(err) => return report(&err),
    };
    let tokens: Arc<dyn TokenSupplier> = Arc::new(supplier);
    let client = match Copilot::new(tokens) {
        Ok(client) => client,
        Err(err) => return report(&err),
    };

    let cancel = interrupt_flag();
    let mut emit = |text: &str| println!("{text}");
    match run_query(&client, &query, streaming, &cancel, &mut emit).await {
        Ok(()) => 0,
        Err(err) => report(&err),
    }
}

fn print_help() {
    println!("M365 Copilot Chat CLI - one-shot chat with Microsoft 365 Copilot");
    println!();
    println!("USAGE:");
    println!("  m365chat login                   Sign in with Microsoft Entra");
    println!("  m365chat logout                  Sign out and clear cached tokens");
    println!("  m365chat [--stream|-s] \"<query>\" Send a one-shot query");
    println!("  m365chat help                    Display this help message");
    println!();
    println!("OPTIONS:");
    println!("  --stream, -s                     Use the streaming endpoint for the response");
    println!();
    println!("AUTHENTICATION:");
    println!("  Before sending queries, run 'm365chat login' and complete the");
    println!("  browser sign-in. Tokens are cached in ~/.m365chat and refreshed");
    println!("  automatically.");
    println!();
    println!("EXAMPLES:");
    println!("  m365chat login");
    println!("  m365chat \"What meetings do I have today?\"");
    println!("  m365chat --stream \"Summarize my recent emails from John\"");
    println!("  m365chat logout");
    println!();
    println!("EXIT CODES:");
    println!("  0 - Success");
    println!("  1 - Authentication error");
    println!("  2 - Permission denied");
    println!("  3 - Network error");
    println!("  4 - Invalid input");
    println!("  5 - Conversation error");
}
