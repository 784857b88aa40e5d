use anyhow::Result;
use clap::Parser;
use colored::*;

use testing_tools::api_client::ApiClient;
use testing_tools::output::print_test_summary;
use testing_tools::scenarios;

#[derive(Parser)]
#[command(name = "sse-test-client")]
#[command(about = "SSE Broadcast Integration Testing Tool")]
struct Cli {
    /// Base URL of the backend (e.g., http://localhost:4000)
    #[arg(long)]
    base_url: String,

    /// Test scenario to run
    #[arg(long, value_enum)]
    scenario: ScenarioChoice,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Two streams on one channel both receive an event
    FanOut,
    /// An event published to one channel does not reach another
    ExclusiveChannels,
    /// Payload strings containing line breaks arrive intact
    Newlines,
    /// Two events arrive in the order they were published
    Ordering,
    /// A closed stream is unsubscribed
    Close,
    /// Run all scenarios
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== SETUP PHASE ===".bright_white().bold());

    let api_client = ApiClient::new(reqwest::Client::new(), cli.base_url.clone());
    println!("{} Checking server health...", "→".blue());
    api_client.health().await?;
    println!("{} Server at {} is healthy", "✓".green(), cli.base_url);

    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    let mut results = Vec::new();

    match cli.scenario {
        ScenarioChoice::FanOut => {
            results.push(scenarios::test_fan_out(&api_client).await?);
        }
        ScenarioChoice::ExclusiveChannels => {
            results.push(scenarios::test_exclusive_channels(&api_client).await?);
        }
        ScenarioChoice::Newlines => {
            results.push(scenarios::test_newlines(&api_client).await?);
        }
        ScenarioChoice::Ordering => {
            results.push(scenarios::test_ordering(&api_client).await?);
        }
        ScenarioChoice::Close => {
            results.push(scenarios::test_close(&api_client).await?);
        }
        ScenarioChoice::All => {
            results.push(scenarios::test_fan_out(&api_client).await?);
            results.push(scenarios::test_exclusive_channels(&api_client).await?);
            results.push(scenarios::test_newlines(&api_client).await?);
            results.push(scenarios::test_ordering(&api_client).await?);
            results.push(scenarios::test_close(&api_client).await?);
        }
    }

    // Print summary
    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
