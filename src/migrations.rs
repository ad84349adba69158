use sqlx::MySqlPool;

use crate::{
    args::{DbArgs, MigrationTarget},
    db::{column_exists, count_rows, create_pool},
    error::Result,
};

/// What a migration does when one of its statements fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and carry on with the remaining statements.
    LogAndContinue,
    /// Log the failure, stop, and report it to the caller.
    Abort,
}

#[derive(Debug)]
pub struct AddColumn {
    pub table: &'static str,
    pub column: &'static str,
    pub definition: &'static str,
}

impl AddColumn {
    fn statement(&self) -> String {
        format!(
            "ALTER TABLE `{}` ADD COLUMN `{}` {}",
            self.table, self.column, self.definition
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seed {
    MlTrainingData,
    MlBaselineModel,
}

#[derive(Debug)]
pub struct Migration {
    pub name: &'static str,
    pub description: &'static str,
    pub create_tables: &'static [(&'static str, &'static str)],
    pub add_columns: &'static [AddColumn],
    pub seeds: &'static [Seed],
    pub on_error: FailurePolicy,
}

const USERS_SQL: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INT AUTO_INCREMENT PRIMARY KEY,
        first_name VARCHAR(100) NOT NULL,
        last_name VARCHAR(100) NOT NULL,
        email VARCHAR(255) NOT NULL UNIQUE,
        password_hash VARCHAR(255) NOT NULL,
        preferences JSON,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
    )
";

const ACCOUNTS_SQL: &str = "
    CREATE TABLE IF NOT EXISTS accounts (
        id INT AUTO_INCREMENT PRIMARY KEY,
        user_id INT NOT NULL,
        account_type ENUM('checking', 'savings', 'credit', 'investment') NOT NULL,
        account_name VARCHAR(100) NOT NULL,
        balance DECIMAL(15, 2) NOT NULL DEFAULT 0.00,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
        INDEX idx_accounts_user (user_id)
    )
";

const TRANSACTIONS_SQL: &str = "
    CREATE TABLE IF NOT EXISTS transactions (
        id INT AUTO_INCREMENT PRIMARY KEY,
        account_id INT NOT NULL,
        amount DECIMAL(15, 2) NOT NULL,
        category VARCHAR(100),
        transaction_type ENUM('income', 'expense', 'transfer') NOT NULL,
        description VARCHAR(255),
        transaction_date DATE NOT NULL,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
        FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE,
        INDEX idx_transactions_account_date (account_id, transaction_date)
    )
";

const PASSWORD_RESET_TOKENS_SQL: &str = "
    CREATE TABLE IF NOT EXISTS password_reset_tokens (
        id INT AUTO_INCREMENT PRIMARY KEY,
        user_id INT NOT NULL,
        token VARCHAR(255) NOT NULL UNIQUE,
        expires_at TIMESTAMP NOT NULL,
        used BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
        INDEX idx_reset_tokens_expiry (expires_at)
    )
";

const GOALS_SQL: &str = "
    CREATE TABLE IF NOT EXISTS goals (
        id INT AUTO_INCREMENT PRIMARY KEY,
        user_id INT NOT NULL,
        goal_type ENUM('savings', 'debt_payoff', 'investment', 'purchase', 'emergency_fund', 'other') NOT NULL,
        title VARCHAR(150) NOT NULL,
        description TEXT,
        target_amount DECIMAL(15, 2) NOT NULL,
        current_amount DECIMAL(15, 2) NOT NULL DEFAULT 0.00,
        deadline DATE,
        priority ENUM('low', 'medium', 'high') NOT NULL DEFAULT 'medium',
        status ENUM('active', 'completed', 'paused', 'cancelled') NOT NULL DEFAULT 'active',
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
        INDEX idx_goals_user_status (user_id, status)
    )
";

const GOAL_TRANSACTIONS_SQL: &str = "
    CREATE TABLE IF NOT EXISTS goal_transactions (
        id INT AUTO_INCREMENT PRIMARY KEY,
        goal_id INT NOT NULL,
        transaction_id INT NULL,
        amount DECIMAL(15, 2) NOT NULL,
        note VARCHAR(255),
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (goal_id) REFERENCES goals(id) ON DELETE CASCADE,
        FOREIGN KEY (transaction_id) REFERENCES transactions(id) ON DELETE SET NULL
    )
";

const GOAL_PROGRESS_SQL: &str = "
    CREATE TABLE IF NOT EXISTS goal_progress (
        id INT AUTO_INCREMENT PRIMARY KEY,
        goal_id INT NOT NULL,
        amount DECIMAL(15, 2) NOT NULL,
        progress_percentage DECIMAL(5, 2) NOT NULL,
        recorded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (goal_id) REFERENCES goals(id) ON DELETE CASCADE,
        INDEX idx_goal_progress_goal (goal_id, recorded_at)
    )
";

const ML_TRAINING_DATA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS ml_training_data (
        id INT AUTO_INCREMENT PRIMARY KEY,
        description VARCHAR(255) NOT NULL,
        category VARCHAR(100) NOT NULL,
        source VARCHAR(50) NOT NULL DEFAULT 'sample',
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        INDEX idx_training_category (category)
    )
";

const ML_MODELS_SQL: &str = "
    CREATE TABLE IF NOT EXISTS ml_models (
        id INT AUTO_INCREMENT PRIMARY KEY,
        name VARCHAR(100) NOT NULL UNIQUE,
        version VARCHAR(20) NOT NULL,
        algorithm VARCHAR(50) NOT NULL,
        accuracy DECIMAL(5, 4),
        is_active BOOLEAN NOT NULL DEFAULT FALSE,
        trained_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )
";

const ML_BASELINE_MODEL_SQL: &str = "
    INSERT IGNORE INTO ml_models (name, version, algorithm, accuracy, is_active)
    VALUES ('transaction-categorizer', '1.0.0', 'naive_bayes', 0.8500, TRUE)
";

/// Labelled descriptions loaded once so the categoriser has something to train on.
pub const SAMPLE_TRAINING_DATA: &[(&str, &str)] = &[
    ("WHOLE FOODS MARKET", "Groceries"),
    ("TRADER JOES", "Groceries"),
    ("SAFEWAY STORE", "Groceries"),
    ("STARBUCKS COFFEE", "Dining"),
    ("MCDONALDS", "Dining"),
    ("CHIPOTLE MEXICAN GRILL", "Dining"),
    ("SHELL OIL", "Transportation"),
    ("UBER TRIP", "Transportation"),
    ("CHEVRON GAS STATION", "Transportation"),
    ("NETFLIX SUBSCRIPTION", "Entertainment"),
    ("SPOTIFY PREMIUM", "Entertainment"),
    ("AMC THEATRES", "Entertainment"),
    ("PG&E ELECTRIC BILL", "Utilities"),
    ("COMCAST INTERNET", "Utilities"),
    ("WATER UTILITY PAYMENT", "Utilities"),
    ("AMAZON MARKETPLACE", "Shopping"),
    ("TARGET STORE", "Shopping"),
    ("CVS PHARMACY", "Healthcare"),
    ("KAISER PERMANENTE", "Healthcare"),
    ("PAYROLL DIRECT DEPOSIT", "Income"),
    ("MONTHLY RENT PAYMENT", "Housing"),
];

pub static CORE_TABLES: Migration = Migration {
    name: "core_tables",
    description: "users, accounts and transactions",
    create_tables: &[
        ("users", USERS_SQL),
        ("accounts", ACCOUNTS_SQL),
        ("transactions", TRANSACTIONS_SQL),
    ],
    add_columns: &[],
    seeds: &[],
    on_error: FailurePolicy::LogAndContinue,
};

pub static PASSWORD_RESET_TOKENS: Migration = Migration {
    name: "password_reset_tokens",
    description: "password reset tokens",
    create_tables: &[("password_reset_tokens", PASSWORD_RESET_TOKENS_SQL)],
    add_columns: &[],
    seeds: &[],
    on_error: FailurePolicy::LogAndContinue,
};

pub static GOALS: Migration = Migration {
    name: "goals",
    description: "goals, goal transactions and goal progress",
    create_tables: &[
        ("goals", GOALS_SQL),
        ("goal_transactions", GOAL_TRANSACTIONS_SQL),
        ("goal_progress", GOAL_PROGRESS_SQL),
    ],
    add_columns: &[],
    seeds: &[],
    on_error: FailurePolicy::Abort,
};

pub static ML: Migration = Migration {
    name: "ml",
    description: "categorisation columns, training data and model registry",
    create_tables: &[
        ("ml_training_data", ML_TRAINING_DATA_SQL),
        ("ml_models", ML_MODELS_SQL),
    ],
    add_columns: &[
        AddColumn {
            table: "transactions",
            column: "ml_category",
            definition: "VARCHAR(100) NULL",
        },
        AddColumn {
            table: "transactions",
            column: "ml_confidence",
            definition: "DECIMAL(5, 4) NULL",
        },
        AddColumn {
            table: "transactions",
            column: "ml_scores",
            definition: "JSON NULL",
        },
        AddColumn {
            table: "transactions",
            column: "user_verified",
            definition: "BOOLEAN NOT NULL DEFAULT FALSE",
        },
        AddColumn {
            table: "transactions",
            column: "categorized_at",
            definition: "TIMESTAMP NULL",
        },
    ],
    seeds: &[Seed::MlTrainingData, Seed::MlBaselineModel],
    on_error: FailurePolicy::Abort,
};

/// Dependency order: goals reference transactions, ML alters transactions.
pub fn migrations_for(target: MigrationTarget) -> Vec<&'static Migration> {
    match target {
        MigrationTarget::All => vec![&CORE_TABLES, &PASSWORD_RESET_TOKENS, &GOALS, &ML],
        MigrationTarget::Core => vec![&CORE_TABLES],
        MigrationTarget::PasswordReset => vec![&PASSWORD_RESET_TOKENS],
        MigrationTarget::Goals => vec![&GOALS],
        MigrationTarget::Ml => vec![&ML],
    }
}

fn handle_failure(migration: &Migration, step: &str, err: sqlx::Error) -> Result<()> {
    tracing::error!(
        "Migration {} failed at step={}: {:#?}",
        migration.name,
        step,
        err
    );
    match migration.on_error {
        FailurePolicy::LogAndContinue => Ok(()),
        FailurePolicy::Abort => Err(err.into()),
    }
}

async fn seed_training_data(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    let existing = count_rows(pool, "ml_training_data").await?;
    if existing > 0 {
        tracing::info!(
            "ml_training_data already holds {} rows, skipping sample data",
            existing
        );
        return Ok(());
    }

    let placeholders = vec!["(?, ?, 'sample')"; SAMPLE_TRAINING_DATA.len()].join(", ");
    let sql = format!(
        "INSERT INTO ml_training_data (description, category, source) VALUES {}",
        placeholders
    );

    let mut query = sqlx::query(&sql);
    for (description, category) in SAMPLE_TRAINING_DATA.iter() {
        query = query.bind(*description).bind(*category);
    }
    let result = query.execute(pool).await?;

    tracing::info!("Inserted {} training rows", result.rows_affected());
    Ok(())
}

async fn apply_seed(pool: &MySqlPool, seed: Seed) -> Result<(), sqlx::Error> {
    match seed {
        Seed::MlTrainingData => seed_training_data(pool).await,
        Seed::MlBaselineModel => sqlx::query(ML_BASELINE_MODEL_SQL)
            .execute(pool)
            .await
            .map(|result| {
                tracing::info!("Baseline model rows inserted: {}", result.rows_affected())
            }),
    }
}

/// Applies every step of `migration` on the given pool. Each step is
/// idempotent, so re-running against an already provisioned database is a
/// no-op.
pub async fn apply(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    tracing::info!(
        "Running migration {} ({})",
        migration.name,
        migration.description
    );

    for (table, sql) in migration.create_tables.iter() {
        match sqlx::query(sql).execute(pool).await {
            Ok(_) => tracing::info!("Table {} is ready", table),
            Err(err) => handle_failure(migration, table, err)?,
        }
    }

    for add_column in migration.add_columns.iter() {
        let step = format!("{}.{}", add_column.table, add_column.column);
        let outcome = match column_exists(pool, add_column.table, add_column.column).await {
            Ok(true) => {
                tracing::info!("Column {} already exists", &step);
                Ok(())
            }
            Ok(false) => sqlx::query(&add_column.statement())
                .execute(pool)
                .await
                .map(|_| tracing::info!("Added column {}", &step)),
            Err(err) => Err(err),
        };
        if let Err(err) = outcome {
            handle_failure(migration, &step, err)?;
        }
    }

    for seed in migration.seeds.iter() {
        if let Err(err) = apply_seed(pool, *seed).await {
            handle_failure(migration, &format!("{:?}", seed), err)?;
        }
    }

    tracing::info!("Finished migration {}", migration.name);
    Ok(())
}

/// Opens a connection, applies the migrations in order, and closes the
/// connection whether or not they succeeded.
pub async fn run_migrations(db: &DbArgs, migrations: &[&Migration]) -> Result<()> {
    let pool = create_pool(db).await.inspect_err(|err| {
        tracing::error!("Unable to connect to the database: {:#?}", err);
    })?;

    apply_then_close(pool, migrations).await
}

pub async fn apply_then_close(pool: MySqlPool, migrations: &[&Migration]) -> Result<()> {
    let mut outcome = Ok(());
    for migration in migrations.iter() {
        outcome = apply(&pool, migration).await;
        if outcome.is_err() {
            break;
        }
    }

    pool.close().await;
    tracing::info!("Database connection closed");

    outcome
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};

    use super::*;
    use crate::error::Error;

    fn all_migrations() -> Vec<&'static Migration> {
        migrations_for(MigrationTarget::All)
    }

    #[test]
    fn every_create_statement_is_idempotent() {
        for migration in all_migrations() {
            for (table, sql) in migration.create_tables.iter() {
                assert!(
                    sql.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table)),
                    "{} in {} is not guarded",
                    table,
                    migration.name
                );
            }
        }
    }

    #[test]
    fn tables_are_created_after_their_references() {
        let mut created: Vec<&str> = vec![];
        for migration in all_migrations() {
            for (table, sql) in migration.create_tables.iter() {
                for referenced in sql
                    .split("REFERENCES ")
                    .skip(1)
                    .filter_map(|rest| rest.split('(').next())
                {
                    assert!(
                        created.contains(&referenced.trim()),
                        "{} references {} before it exists",
                        table,
                        referenced
                    );
                }
                created.push(*table);
            }
        }
    }

    #[test]
    fn failure_policies_match_scripts() {
        assert_eq!(CORE_TABLES.on_error, FailurePolicy::LogAndContinue);
        assert_eq!(PASSWORD_RESET_TOKENS.on_error, FailurePolicy::LogAndContinue);
        assert_eq!(GOALS.on_error, FailurePolicy::Abort);
        assert_eq!(ML.on_error, FailurePolicy::Abort);
    }

    #[test]
    fn swallowed_failures_do_not_propagate() {
        assert!(handle_failure(&CORE_TABLES, "users", sqlx::Error::PoolClosed).is_ok());
        assert!(handle_failure(&GOALS, "goals", sqlx::Error::PoolClosed).is_err());
    }

    #[test]
    fn add_column_statement_targets_table() {
        assert_eq!(
            ML.add_columns[0].statement(),
            "ALTER TABLE `transactions` ADD COLUMN `ml_category` VARCHAR(100) NULL"
        );
    }

    #[test]
    fn single_target_selects_one_migration() {
        let selected = migrations_for(MigrationTarget::Goals);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "goals");
    }

    fn lazy_pool() -> MySqlPool {
        MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(1))
            .connect_lazy_with(
                MySqlConnectOptions::new()
                    .host("127.0.0.1")
                    .port(1)
                    .username("finance"),
            )
    }

    #[tokio::test]
    async fn log_and_continue_scripts_finish_despite_failures() {
        let pool = lazy_pool();
        pool.close().await;

        assert!(apply(&pool, &CORE_TABLES).await.is_ok());
        assert!(apply(&pool, &PASSWORD_RESET_TOKENS).await.is_ok());
    }

    #[tokio::test]
    async fn abort_scripts_report_the_first_failure() {
        let pool = lazy_pool();
        pool.close().await;

        assert!(matches!(
            apply(&pool, &GOALS).await,
            Err(Error::Database(sqlx::Error::PoolClosed))
        ));
        assert!(matches!(
            apply(&pool, &ML).await,
            Err(Error::Database(sqlx::Error::PoolClosed))
        ));
    }

    #[tokio::test]
    async fn pool_is_closed_after_an_aborted_run() {
        let pool = lazy_pool();

        let outcome = apply_then_close(pool.clone(), &[&CORE_TABLES, &GOALS, &ML]).await;

        assert!(outcome.is_err());
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn pool_is_closed_after_a_swallowed_failure() {
        let pool = lazy_pool();

        let outcome = apply_then_close(pool.clone(), &[&CORE_TABLES]).await;

        assert!(outcome.is_ok());
        assert!(pool.is_closed());
    }

    #[tokio::test]
    #[ignore = "needs a MySQL database in TEST_DATABASE_URL"]
    async fn running_twice_is_a_no_op() {
        let url = std::env::var("TEST_DATABASE_URL").unwrap();
        let pool = MySqlPool::connect(&url).await.unwrap();

        for _ in 0..2 {
            for migration in all_migrations() {
                apply(&pool, migration).await.unwrap();
            }
        }

        let rows = count_rows(&pool, "ml_training_data").await.unwrap();
        assert_eq!(rows, SAMPLE_TRAINING_DATA.len() as i64);
        let models = count_rows(&pool, "ml_models").await.unwrap();
        assert_eq!(models, 1);
    }
}
