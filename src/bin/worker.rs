#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = checkwork::run_worker().await {
        eprintln!("checkwork-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
