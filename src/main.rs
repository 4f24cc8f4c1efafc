//! ec2-reaper: terminate EC2 instances past their allowed age
//!
//! Thin shell around the decision core: resolves settings from the
//! environment, builds the AWS clients, and runs one reaper pass. All
//! behavior flags come from environment variables (see `config`), so the
//! same invocation works from cron, a container, or an operator shell.

use anyhow::Result;
use clap::Parser;
use ec2_reaper::aws::{classify_anyhow_error, AwsContext, Ec2Client};
use ec2_reaper::config::{EnvSource, Settings};
use ec2_reaper::reaper::{self, RunOutcome};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ec2-reaper")]
#[command(about = "Terminates EC2 instances past their allowed age unless tagged immune")]
#[command(version)]
struct Args {
    /// AWS region to reap
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long)]
    aws_profile: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if let Some(hint) = classify_anyhow_error(e).suggestion() {
        let _ = writeln!(stderr, "  \x1b[2mHint:\x1b[0m {hint}");
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if let Some(profile) = &args.aws_profile {
        info!(profile = %profile, "Using AWS profile");
    }

    let settings = Settings::resolve(&EnvSource);
    info!(
        region = %args.region,
        dry_run = settings.dry_run,
        max_age_days = settings.max_age_days,
        cutoff = %settings.cutoff,
        immunity_tags = settings.immunity_tags.len(),
        ignore_termination_protection = settings.ignore_termination_protection,
        "Starting reaper run"
    );

    let aws = AwsContext::new(&args.region, args.aws_profile.as_deref()).await;
    let ec2 = Ec2Client::from_context(&aws);

    let outcome = reaper::run(&settings, &ec2).await?;

    match outcome {
        RunOutcome::NoVictims => println!("No instances matched."),
        RunOutcome::DryRunReport(ids) => {
            println!("Dry run: {} instance(s) would have been terminated.", ids.len());
        }
        RunOutcome::Terminated(ids) => println!("Terminated {} instance(s).", ids.len()),
    }

    Ok(())
}
