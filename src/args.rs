use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::email::DEFAULT_DELIVERY_DELAY;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Finance application tooling", long_about = None)]
pub struct Args {
    #[arg(long, global = true, default_value_t = String::from(""), help = "The log directory e.g. '/var/logs'. If this is not provided, only logs out to stdout.")]
    pub base_log_dir: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DbArgs {
    #[arg(long, env = "DB_HOST", default_value_t = String::from("localhost"))]
    pub db_host: String,

    #[arg(long, env = "DB_PORT", default_value_t = 3306u16)]
    pub db_port: u16,

    #[arg(long, env = "DB_USER", default_value_t = String::from("root"))]
    pub db_user: String,

    #[arg(long, env = "DB_PASSWORD", default_value_t = String::from(""), hide_env_values = true)]
    pub db_password: String,

    #[arg(long, env = "DB_NAME", default_value_t = String::from("finance_app"))]
    pub db_name: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or update database tables
    Migrate {
        #[arg(value_enum, default_value_t = MigrationTarget::All)]
        target: MigrationTarget,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Write demo users, accounts and transactions into a local storage file
    SeedDemo {
        #[arg(
            long,
            default_value = "finance_storage.json",
            help = "JSON file standing in for browser local storage"
        )]
        store: PathBuf,

        #[arg(long, help = "Remove previously seeded demo data instead of writing it")]
        clear: bool,
    },

    /// Simulate sending a password reset email
    SendResetEmail {
        #[arg(long)]
        email: String,

        #[arg(long)]
        token: String,

        #[arg(
            long,
            env = "REACT_APP_BASE_URL",
            default_value_t = String::from("http://localhost:3000"),
            help = "Base URL of the web application used to build the reset link"
        )]
        base_url: String,

        #[arg(long, default_value_t = DEFAULT_DELIVERY_DELAY.as_millis() as u64, help = "Simulated delivery delay in milliseconds")]
        delay_ms: u64,
    },

    /// Simulate sending a password changed confirmation email
    SendPasswordChangedEmail {
        #[arg(long)]
        email: String,

        #[arg(long, default_value_t = DEFAULT_DELIVERY_DELAY.as_millis() as u64, help = "Simulated delivery delay in milliseconds")]
        delay_ms: u64,
    },

    /// Run an HTTP smoke-test suite against a running backend
    Smoke {
        #[arg(value_enum)]
        suite: SmokeSuite,

        #[arg(
            long,
            env = "REACT_APP_BASE_URL",
            default_value_t = String::from("http://localhost:5000"),
            help = "Base URL of the backend e.g. \"http://localhost:5000\""
        )]
        base_url: String,

        #[arg(long, default_value_t = 1u64, help = "User id used for the dashboard request")]
        user_id: u64,

        #[arg(
            long,
            default_value_t = String::from("data/transactions.csv"),
            help = "Dataset path passed to the train-dataset endpoint"
        )]
        dataset: String,
    },

    /// Render a categorisation suggestion card and optionally accept or reject it
    Review {
        #[arg(help = "Suggestion JSON e.g. '{\"category\":\"Food\",\"confidence\":0.72}'")]
        suggestion: String,

        #[arg(long)]
        busy: bool,

        #[arg(long, value_enum)]
        decision: Option<Decision>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationTarget {
    All,
    Core,
    PasswordReset,
    Goals,
    Ml,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmokeSuite {
    Server,
    Ml,
    Training,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

pub fn parse_args() -> Args {
    return Args::parse();
}
