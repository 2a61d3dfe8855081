use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use client_core::{session, PortalClient, ResultsProvider, SystemClock};
use shared::{
    domain::CandidateStatus,
    format::format_time_taken,
    protocol::{CandidateResult, ResultStatus},
};
use storage::{LocalStore, SqliteStore};
use tracing::info;

mod config;
mod interview;

use config::load_settings;

#[derive(Parser, Debug)]
#[command(name = "candidate", about = "Take a timed interview from the terminal")]
struct Cli {
    /// Overrides the configured API base url.
    #[arg(long)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with the temporary password from the invitation email.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        temp_password: String,
    },
    /// Start or resume the interview.
    Interview,
    /// Show the completion summary.
    Complete,
    /// Show published results.
    Results,
    /// Forget the signed-in candidate. Saved answers stay on this machine.
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut settings = load_settings();
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Some(api_url) = cli.api_url {
        settings.api_url = api_url;
    }
    info!(api_url = %settings.api_url, store_url = %settings.store_url, "candidate starting");

    let sqlite = SqliteStore::new(&settings.store_url).await?;
    sqlite.health_check().await?;
    let store: Arc<dyn LocalStore> = Arc::new(sqlite);
    let client = PortalClient::new(settings.api_url.clone())?;

    match cli.command {
        Command::Login {
            email,
            temp_password,
        } => {
            let profile = client
                .authenticate(&email, &temp_password)
                .await
                .map_err(|err| anyhow!(err.user_message()))?;
            session::record_login(&*store, &profile).await?;
            println!("Welcome, {}!", profile.full_name());
            println!("Campaign: {}", profile.campaign.name);
            if profile.status == CandidateStatus::Completed {
                println!("You have already completed this interview. Run `candidate results`.");
            } else {
                println!("Run `candidate interview` when you are ready to begin.");
            }
        }
        Command::Interview => interview::run(&settings, store, client).await?,
        Command::Complete => {
            let time_taken = session::time_taken(&*store).await?.unwrap_or(0);
            println!("Interview completed. Thank you!");
            println!("Time taken: {}", format_time_taken(time_taken));
            println!("Your answers have been submitted. Results will be shared once they are reviewed.");
        }
        Command::Results => {
            let Some(candidate_id) = session::current_candidate(&*store).await? else {
                println!("Please login first.");
                return Ok(());
            };
            let mut result = client
                .fetch_results(&candidate_id)
                .await
                .map_err(|err| anyhow!(err.user_message()))?;
            if result.time_taken.is_none() {
                result.time_taken =
                    Some(session::time_taken_or_elapsed(&*store, &SystemClock).await?);
            }
            print_result(&result);
        }
        Command::Logout => {
            session::clear_session(&*store).await?;
            println!("Logged out.");
        }
    }

    Ok(())
}

fn print_result(result: &CandidateResult) {
    println!("{} <{}>", result.name, result.email);
    println!("{}", result.campaign);
    println!();
    println!("Rank: #{} of {}", result.rank, result.total_candidates);
    println!("Percentile: {:.1}th", result.percentile());
    let status = match result.status {
        ResultStatus::Passed => "PASSED",
        ResultStatus::Failed => "FAILED",
        ResultStatus::Pending => "PENDING REVIEW",
    };
    println!(
        "Total score: {:.1} (passing {:.1}) {status}",
        result.scores.total, result.passing_score
    );
    println!(
        "Technical {:.1} | Behavioral {:.1} | Logical {:.1}",
        result.scores.technical, result.scores.behavioral, result.scores.logical
    );
    println!(
        "Time taken: {}",
        format_time_taken(result.time_taken.unwrap_or(0))
    );
    if !result.breakdown.is_empty() {
        println!();
        for item in &result.breakdown {
            println!("  {:<40} {:>6.1} / {:.1}", item.question, item.score, item.max_score);
        }
    }
}
