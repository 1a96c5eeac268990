//! Account name validation and lazy account registration.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;

use crate::error::IndexerError;
use crate::store::StoreGateway;

/// Returns `true` if `name` matches `^[a-z][a-z0-9\-.]{2,15}$`.
pub fn is_valid_account_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if !(3..=16).contains(&bytes.len()) {
        return false;
    }
    bytes[0].is_ascii_lowercase()
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-' || *b == b'.')
}

/// Register every not-yet-known account in `names`, created at `date`.
///
/// Returns the number of accounts created. Invalid names are skipped.
pub async fn register_accounts(
    store: &dyn StoreGateway,
    names: &BTreeSet<String>,
    date: NaiveDateTime,
) -> Result<usize, IndexerError> {
    let mut created = 0;
    for name in names {
        if !is_valid_account_name(name) {
            tracing::debug!(name = %name, "skipping invalid account name");
            continue;
        }
        if store.account_exists(name).await? {
            continue;
        }
        store.insert_account(name, date).await?;
        created += 1;
    }
    Ok(created)
}
