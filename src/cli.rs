// LockVault CLI client
//
// A small RPC client exercising register/lock-shared/lock-exclusive/unlock
// against a running lockvault-server.

use std::process::ExitCode;

use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct RegisterTransactionRequest {
    transaction_id: u32,
    lock_budget: u32,
}

#[derive(Serialize)]
struct LockRequest {
    transaction_id: u32,
    row_id: u32,
}

fn usage() -> &'static str {
    "usage: lockvault-cli <base-url> <command> [args]\n\
     commands:\n  \
     register <transaction-id> <lock-budget>\n  \
     lock-shared <transaction-id> <row-id>\n  \
     lock-exclusive <transaction-id> <row-id>\n  \
     unlock <transaction-id> <row-id>\n  \
     public-key"
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_target(false).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("{}", usage());
        return ExitCode::FAILURE;
    }

    let base_url = args[0].trim_end_matches('/');
    let client = reqwest::Client::new();

    let result = match args[1].as_str() {
        "register" if args.len() == 4 => {
            let req = RegisterTransactionRequest {
                transaction_id: parse_u32(&args[2]),
                lock_budget: parse_u32(&args[3]),
            };
            post(&client, &format!("{base_url}/v1/transactions"), &req).await
        }
        "lock-shared" if args.len() == 4 => {
            let req = LockRequest { transaction_id: parse_u32(&args[2]), row_id: parse_u32(&args[3]) };
            post(&client, &format!("{base_url}/v1/locks/shared"), &req).await
        }
        "lock-exclusive" if args.len() == 4 => {
            let req = LockRequest { transaction_id: parse_u32(&args[2]), row_id: parse_u32(&args[3]) };
            post(&client, &format!("{base_url}/v1/locks/exclusive"), &req).await
        }
        "unlock" if args.len() == 4 => {
            let req = LockRequest { transaction_id: parse_u32(&args[2]), row_id: parse_u32(&args[3]) };
            post(&client, &format!("{base_url}/v1/locks/unlock"), &req).await
        }
        "public-key" => get(&client, &format!("{base_url}/v1/public-key")).await,
        _ => {
            eprintln!("{}", usage());
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body).unwrap_or(body.to_string()));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("request failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn parse_u32(s: &str) -> u32 {
    s.parse().unwrap_or_else(|_| {
        eprintln!("expected an integer id, got {s:?}");
        std::process::exit(1);
    })
}

async fn post<T: Serialize>(client: &reqwest::Client, url: &str, body: &T) -> Result<Value, reqwest::Error> {
    client.post(url).json(body).send().await?.json::<Value>().await
}

async fn get(client: &reqwest::Client, url: &str) -> Result<Value, reqwest::Error> {
    client.get(url).send().await?.json::<Value>().await
}
