use anyhow::Result;
use aurabot::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
