use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::{
    domain::{Account, AccountType, SetupMarker, Transaction, TransactionType, User},
    error::{Error, Result},
    storage::KeyValueStore,
};

pub const SETUP_MARKER_KEY: &str = "finance_demo_setup";
pub const USERS_KEY: &str = "finance_users";

pub fn accounts_key(user_id: &str) -> String {
    format!("finance_accounts_{}", user_id)
}

pub fn transactions_key(account_id: &str) -> String {
    format!("finance_transactions_{}", account_id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded {
        users: usize,
        accounts: usize,
        transactions: usize,
    },
    AlreadySeeded,
}

fn demo_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

fn date(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        Error::InvalidInput(format!("invalid demo date {}-{}-{}", year, month, day))
    })
}

fn demo_users() -> Vec<User> {
    vec![
        User {
            id: String::from("demo-user-1"),
            first_name: String::from("Alex"),
            last_name: String::from("Morgan"),
            email: String::from("alex.morgan@example.com"),
            created_at: demo_timestamp(),
        },
        User {
            id: String::from("demo-user-2"),
            first_name: String::from("Sam"),
            last_name: String::from("Rivera"),
            email: String::from("sam.rivera@example.com"),
            created_at: demo_timestamp(),
        },
    ]
}

fn account(
    id: &str,
    user_id: &str,
    account_type: AccountType,
    account_name: &str,
    balance: f64,
) -> Account {
    Account {
        id: id.to_string(),
        user_id: user_id.to_string(),
        account_type,
        account_name: account_name.to_string(),
        balance,
        created_at: demo_timestamp(),
    }
}

fn demo_accounts(user_id: &str) -> Vec<Account> {
    match user_id {
        "demo-user-1" => vec![
            account("demo-acc-1", user_id, AccountType::Checking, "Everyday Checking", 2450.75),
            account("demo-acc-2", user_id, AccountType::Savings, "Rainy Day Savings", 8200.00),
            account("demo-acc-3", user_id, AccountType::Credit, "Rewards Card", -615.40),
        ],
        "demo-user-2" => vec![
            account("demo-acc-4", user_id, AccountType::Checking, "Main Checking", 1320.10),
            account("demo-acc-5", user_id, AccountType::Investment, "Index Fund", 15400.00),
        ],
        _ => vec![],
    }
}

struct TransactionTemplate {
    amount: f64,
    category: &'static str,
    transaction_type: TransactionType,
    description: &'static str,
    day: u32,
}

const MONTHLY_PATTERN: &[TransactionTemplate] = &[
    TransactionTemplate {
        amount: 3200.00,
        category: "Income",
        transaction_type: TransactionType::Income,
        description: "PAYROLL DIRECT DEPOSIT",
        day: 1,
    },
    TransactionTemplate {
        amount: -1450.00,
        category: "Housing",
        transaction_type: TransactionType::Expense,
        description: "MONTHLY RENT PAYMENT",
        day: 2,
    },
    TransactionTemplate {
        amount: -86.23,
        category: "Groceries",
        transaction_type: TransactionType::Expense,
        description: "WHOLE FOODS MARKET",
        day: 6,
    },
    TransactionTemplate {
        amount: -45.10,
        category: "Transportation",
        transaction_type: TransactionType::Expense,
        description: "SHELL OIL",
        day: 9,
    },
    TransactionTemplate {
        amount: -15.99,
        category: "Entertainment",
        transaction_type: TransactionType::Expense,
        description: "NETFLIX SUBSCRIPTION",
        day: 12,
    },
    TransactionTemplate {
        amount: -7.45,
        category: "Dining",
        transaction_type: TransactionType::Expense,
        description: "STARBUCKS COFFEE",
        day: 15,
    },
    TransactionTemplate {
        amount: -500.00,
        category: "Transfer",
        transaction_type: TransactionType::Transfer,
        description: "TRANSFER TO SAVINGS",
        day: 20,
    },
];

fn demo_transactions(account: &Account) -> Result<Vec<Transaction>> {
    let pattern: Vec<&TransactionTemplate> = match account.account_type {
        AccountType::Checking => MONTHLY_PATTERN.iter().collect(),
        AccountType::Credit => MONTHLY_PATTERN
            .iter()
            .filter(|template| template.transaction_type == TransactionType::Expense)
            .collect(),
        AccountType::Savings | AccountType::Investment => vec![],
    };

    let mut transactions = vec![];
    for month in 1..=3u32 {
        for (index, template) in pattern.iter().enumerate() {
            transactions.push(Transaction {
                id: format!("{}-txn-{}-{}", account.id, month, index + 1),
                account_id: account.id.clone(),
                amount: template.amount,
                category: template.category.to_string(),
                transaction_type: template.transaction_type,
                description: template.description.to_string(),
                transaction_date: date(2024, month, template.day)?,
            });
        }
    }
    Ok(transactions)
}

/// Writes the demo users, their accounts and the accounts' transactions, then
/// the setup marker. A store that already carries the marker is left
/// untouched.
pub fn seed_demo_data<S: KeyValueStore>(store: &mut S) -> Result<SeedOutcome> {
    if store.get_item(SETUP_MARKER_KEY).is_some() {
        tracing::info!("Demo data already set up, nothing to do");
        return Ok(SeedOutcome::AlreadySeeded);
    }

    let users = demo_users();
    store.set_item(USERS_KEY, serde_json::to_string(&users)?)?;

    let mut account_count = 0;
    let mut transaction_count = 0;
    for user in users.iter() {
        let accounts = demo_accounts(&user.id);
        store.set_item(&accounts_key(&user.id), serde_json::to_string(&accounts)?)?;
        account_count += accounts.len();

        for account in accounts.iter() {
            let transactions = demo_transactions(account)?;
            store.set_item(
                &transactions_key(&account.id),
                serde_json::to_string(&transactions)?,
            )?;
            transaction_count += transactions.len();
        }
    }

    let marker = SetupMarker {
        seeded_at: Utc::now(),
        users: users.len(),
        accounts: account_count,
        transactions: transaction_count,
    };
    store.set_item(SETUP_MARKER_KEY, serde_json::to_string(&marker)?)?;

    tracing::info!(
        "Seeded {} users, {} accounts and {} transactions",
        users.len(),
        account_count,
        transaction_count
    );

    Ok(SeedOutcome::Seeded {
        users: users.len(),
        accounts: account_count,
        transactions: transaction_count,
    })
}

/// Removes everything the seeder writes, marker included. Returns the number
/// of keys removed.
pub fn clear_demo_data<S: KeyValueStore>(store: &mut S) -> Result<usize> {
    let mut seeded_keys = vec![SETUP_MARKER_KEY.to_string(), USERS_KEY.to_string()];
    for user in demo_users().iter() {
        seeded_keys.push(accounts_key(&user.id));
        for account in demo_accounts(&user.id).iter() {
            seeded_keys.push(transactions_key(&account.id));
        }
    }

    let existing = store.keys();
    let demo_keys: Vec<String> = seeded_keys
        .into_iter()
        .filter(|key| existing.contains(key))
        .collect();

    for key in demo_keys.iter() {
        store.remove_item(key)?;
    }

    tracing::info!("Removed {} demo keys", demo_keys.len());
    Ok(demo_keys.len())
}
