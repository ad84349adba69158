mod args;
mod db;
mod demo;
mod domain;
mod email;
mod error;
mod logging;
mod migrations;
mod smoke;
mod storage;
mod suggestion;

use std::{process::ExitCode, time::Duration};

use args::{Command, Decision, parse_args};
use demo::{SeedOutcome, clear_demo_data, seed_demo_data};
use email::EmailService;
use error::Result;
use logging::{LogConfig, setup_logging};
use migrations::{migrations_for, run_migrations};
use smoke::{SmokeParams, run_suite};
use storage::FileStore;
use suggestion::{Suggestion, SuggestionCard};

fn tool_name(command: &Command) -> &'static str {
    match command {
        Command::Migrate { .. } => "migrate",
        Command::SeedDemo { .. } => "seed-demo",
        Command::SendResetEmail { .. } | Command::SendPasswordChangedEmail { .. } => "email",
        Command::Smoke { .. } => "smoke",
        Command::Review { .. } => "review",
    }
}

async fn run(command: Command) -> Result<bool> {
    match command {
        Command::Migrate { target, db } => {
            run_migrations(&db, &migrations_for(target)).await?;
            Ok(true)
        }
        Command::SeedDemo { store, clear } => {
            let mut store = FileStore::open(&store)?;
            if clear {
                clear_demo_data(&mut store)?;
            } else if seed_demo_data(&mut store)? == SeedOutcome::AlreadySeeded {
                tracing::info!("Run with --clear first to reseed");
            }
            Ok(true)
        }
        Command::SendResetEmail {
            email,
            token,
            base_url,
            delay_ms,
        } => {
            let result = EmailService::new(&base_url, Duration::from_millis(delay_ms))
                .send_password_reset_email(&email, &token)
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(result.success)
        }
        Command::SendPasswordChangedEmail { email, delay_ms } => {
            // The confirmation carries no link, so no base URL is needed.
            let result = EmailService::new("http://localhost", Duration::from_millis(delay_ms))
                .send_password_changed_email(&email)
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(result.success)
        }
        Command::Smoke {
            suite,
            base_url,
            user_id,
            dataset,
        } => {
            let params = SmokeParams {
                user_id,
                dataset_path: dataset,
            };
            let report = run_suite(&reqwest::Client::new(), &base_url, suite, &params).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(report.all_succeeded())
        }
        Command::Review {
            suggestion,
            busy,
            decision,
        } => {
            let suggestion: Suggestion = serde_json::from_str(&suggestion)?;
            let Some(card) = SuggestionCard::new(Some(&suggestion), busy) else {
                return Ok(true);
            };
            println!("{}", card);

            let dispatched = match decision {
                Some(Decision::Accept) => card.accept(|s| {
                    tracing::info!("Accepted category={} for review", &s.category)
                }),
                Some(Decision::Reject) => card.reject(|s| {
                    tracing::info!("Rejected category={} for review", &s.category)
                }),
                None => true,
            };
            if !dispatched {
                tracing::warn!("Suggestion is busy, decision was not applied");
            }
            Ok(dispatched)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = parse_args();

    setup_logging(&LogConfig {
        base_log_dir: &args.base_log_dir,
        tool: tool_name(&args.command),
    });

    match run(args.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
