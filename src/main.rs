#[tokio::main]
async fn main() {
    if let Err(e) = intent_gateway::run().await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
