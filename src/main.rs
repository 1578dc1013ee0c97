#[tokio::main]
async fn main() {
    if let Err(e) = rehabtrack_lib::run().await {
        eprintln!("rehabtrack: {e}");
        std::process::exit(1);
    }
}
