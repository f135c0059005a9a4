use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = reddit_forward_proxy::cli::Cli::parse();
    if let Err(e) = reddit_forward_proxy::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
