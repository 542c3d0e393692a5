// Partition naming derived from organization names.
//
// Distinct names can normalize to the same slug ("Acme Inc." and "acme-inc"
// both become "acme_inc"). Nothing here guards against that.

lazy_static::lazy_static! {
    static ref NON_ALPHANUMERIC_RUN: regex::Regex = regex::Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Prefix for every tenant partition name
pub const PARTITION_PREFIX: &str = "org_";

/// Convert a name to a lowercase slug suitable for collection names.
///
/// Runs of non-alphanumeric characters collapse to a single `_`, and
/// leading/trailing separators are trimmed: `"Acme Inc."` -> `"acme_inc"`.
pub fn slugify(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    NON_ALPHANUMERIC_RUN
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Physical partition name for an organization
pub fn partition_name_for(name: &str) -> String {
    format!("{}{}", PARTITION_PREFIX, slugify(name))
}
