fn usage() -> ! {
    eprintln!(
        "usage: gradectl release <exercise_id> <grader_email>\n       \
                gradectl undo <exercise_id>\n       \
                gradectl batch-assess <exercise_id> <grader_email> <points> <feedback>"
    );
    std::process::exit(2);
}

fn parse_i64(value: &str) -> i64 {
    match value.parse() {
        Ok(value) => value,
        Err(_) => usage(),
    }
}

fn parse_i32(value: &str) -> i32 {
    match value.parse() {
        Ok(value) => value,
        Err(_) => usage(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let result = match args.first().map(String::as_str) {
        Some("release") if args.len() == 3 => {
            plussa_grading::release_feedbacks(parse_i64(&args[1]), &args[2]).await
        }
        Some("undo") if args.len() == 2 => {
            plussa_grading::undo_release(parse_i64(&args[1])).await
        }
        Some("batch-assess") if args.len() == 5 => {
            plussa_grading::batch_assess(
                parse_i64(&args[1]),
                &args[2],
                parse_i32(&args[3]),
                &args[4],
            )
            .await
        }
        _ => usage(),
    };

    if let Err(e) = result {
        eprintln!("gradectl fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
