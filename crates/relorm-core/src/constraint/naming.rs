//! Deterministic constraint names.

/// Length of the hash part of a generated name. With a three character
/// prefix the result fits every supported dialect's identifier limit.
const HASH_LEN: usize = 27;

/// Name of the foreign key on `table` over `columns`.
pub fn foreign_key_name(table: &str, columns: &[String]) -> String {
    hashed_name("FK_", table, columns)
}

/// Name of the primary key on `table` over `columns`.
pub fn primary_key_name(table: &str, columns: &[String]) -> String {
    hashed_name("PK_", table, columns)
}

fn hashed_name(prefix: &str, table: &str, columns: &[String]) -> String {
    let mut sorted: Vec<&str> = columns.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let key = format!("{}{}_{}", prefix, table, sorted.join("_"));
    let hash = blake3::hash(key.as_bytes());
    let hex = hex::encode(hash.as_bytes());
    format!("{}{}", prefix, &hex[..HASH_LEN])
}
