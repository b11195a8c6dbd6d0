use super::types::CompressionAlgorithm;

pub(super) fn default_storage_class() -> String {
    "STANDARD".to_string()
}

pub(super) fn default_algorithm() -> CompressionAlgorithm {
    CompressionAlgorithm::Lz4
}

pub(super) fn default_zstd_level() -> i32 {
    3
}

pub(super) fn default_min_part_size() -> u64 {
    1024 * 1024 * 1024 // 1 GiB
}

pub(super) fn default_sentinel_name() -> String {
    "pg_control".to_string()
}

/// Directories and files whose contents are never worth archiving: logs,
/// the WAL itself, and runtime state rebuilt on startup.
pub(super) fn default_excludes() -> Vec<String> {
    [
        "pg_log",
        "pg_xlog",
        "pg_wal",
        "pgsql_tmp",
        "postgresql.auto.conf.tmp",
        "postmaster.pid",
        "postmaster.opts",
        "recovery.conf",
        "pg_dynshmem",
        "pg_notify",
        "pg_replslot",
        "pg_serial",
        "pg_stat_tmp",
        "pg_snapshots",
        "pg_subtrans",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

pub(super) fn default_delta_queue_depth() -> usize {
    256
}
