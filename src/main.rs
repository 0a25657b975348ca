#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = checkwork::run().await {
        eprintln!("checkwork fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
