//! Standalone helper for exercising the relay's `/eth_sendRawTransaction`
//! endpoint, grounded in `tools/create_transaction.py` from the original
//! prototype. That tool also signed transactions locally via `web3.py`;
//! signing is out of scope here (no wallet crate is part of this stack),
//! so this demo takes an already-signed raw transaction hex and forwards
//! it, the way the original's `--mode alchemy` path does.
//!
//! Usage: `cargo run --example create_transaction -- <proxy-url> <raw-tx-hex>`

use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let proxy_url = args
        .next()
        .unwrap_or_else(|| "http://localhost:5500".to_string());
    let raw_tx = match args.next() {
        Some(tx) => tx,
        None => {
            eprintln!("usage: create_transaction <proxy-url> <raw-tx-hex>");
            std::process::exit(1);
        }
    };

    let raw_tx = if raw_tx.starts_with("0x") {
        raw_tx
    } else {
        format!("0x{raw_tx}")
    };

    let payload = json!({
        "jsonrpc": "2.0",
        "method": "eth_sendRawTransaction",
        "params": [raw_tx],
        "id": 1,
    });

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{proxy_url}/eth_sendRawTransaction"))
        .json(&payload)
        .send()
        .await?;

    let body: serde_json::Value = response.json().await?;

    if let Some(error) = body.get("error") {
        eprintln!("transaction rejected: {error}");
        std::process::exit(1);
    }

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
