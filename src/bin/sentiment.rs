//! Classify review text as positive, negative or neutral
//! Run with: cargo run --bin sentiment -- 배송이 빠르다 만족

use anyhow::Result;
use clap::Parser;
use stain_detection::SentimentAnalyzer;

#[derive(Parser, Debug)]
#[command(author, version, about = "Lexicon-based review sentiment", long_about = None)]
struct Args {
    /// Print the full score as JSON instead of the label; only read before the text
    #[arg(long)]
    json: bool,

    /// Review text; multiple arguments are joined with single spaces.
    /// Everything from the first word on is text, including `-_-` or `--json`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    text: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("stain_detection=warn")
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let text = args.text.join(" ");
    let analyzer = SentimentAnalyzer::new();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&analyzer.score(&text))?);
    } else {
        println!("{}", analyzer.analyze(&text));
    }

    Ok(())
}
