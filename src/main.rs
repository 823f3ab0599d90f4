//! NetGuard: device lifecycle and alerting for the local network

#[tokio::main]
async fn main() {
    if let Err(e) = netguard::app::run(std::env::args()).await {
        netguard::log_error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
