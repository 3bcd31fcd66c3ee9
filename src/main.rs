#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = plussa_grading::run().await {
        eprintln!("plussa-grading fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
