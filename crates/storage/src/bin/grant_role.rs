//! Operator tool for bootstrapping administrators: the first admin cannot be
//! promoted through the API because that route already requires one.

use std::env;
use std::process;

use rewards_domain::config::DatabaseConfig;
use rewards_domain::model::{AccountId, Role};
use rewards_domain::storage::AccountStore;
use rewards_storage::SeaOrmStorage;

const USAGE: &str = "Usage: grant_role <account_id> <admin|user>";

#[tokio::main]
async fn main() {
    let mut args = env::args().skip(1);
    let (Some(raw_id), Some(raw_role)) = (args.next(), args.next()) else {
        eprintln!("{USAGE}");
        process::exit(1);
    };

    let account = match raw_id.parse::<i64>() {
        Ok(id) => AccountId::new(id),
        Err(err) => {
            eprintln!("invalid account id `{raw_id}`: {err}");
            process::exit(1);
        }
    };
    let role = match raw_role.as_str() {
        "admin" => Role::Admin,
        "user" => Role::User,
        other => {
            eprintln!("unknown role `{other}`\n{USAGE}");
            process::exit(1);
        }
    };

    let config = match DatabaseConfig::load_from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            process::exit(1);
        }
    };
    let storage = match SeaOrmStorage::connect(config.database_url()).await {
        Ok(storage) => storage,
        Err(err) => {
            eprintln!("failed to open database: {err}");
            process::exit(1);
        }
    };

    match storage.set_role(account, role).await {
        Ok(Some(updated)) => {
            println!("Account {} is now {}", updated.id, updated.role.as_str());
        }
        Ok(None) => {
            eprintln!("account {account} does not exist");
            process::exit(1);
        }
        Err(err) => {
            eprintln!("failed to update role: {err}");
            process::exit(1);
        }
    }
}
