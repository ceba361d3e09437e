pub(crate) use rewards_domain::storage::StorageError;

/// Row contents that no longer map onto a domain value.
pub(crate) fn corrupt(table: &str, detail: impl std::fmt::Display) -> StorageError {
    StorageError::Corrupt(format!("{table}: {detail}"))
}
