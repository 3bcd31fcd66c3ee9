#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let exercise_id = match args.next().as_deref().map(str::parse::<i64>) {
        Some(Ok(id)) => id,
        _ => {
            eprintln!("usage: sync_once <exercise_id>");
            std::process::exit(2);
        }
    };

    if let Err(e) = plussa_grading::sync_exercise_once(exercise_id).await {
        eprintln!("sync_once fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
