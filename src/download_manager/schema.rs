//! Layout of `download_queue.db`: one row per ingestion job.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const DOWNLOAD_JOBS_TABLE_V1: Table = Table {
    name: "download_jobs",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!("source_type", &SqlType::Text, non_null = true),
        sqlite_column!("canonical_url", &SqlType::Text, non_null = true),
        sqlite_column!("media_id", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!(
            "progress",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("error_code", &SqlType::Text),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("mb_recording_id", &SqlType::Text),
        sqlite_column!("page_title", &SqlType::Text),
        sqlite_column!("page_thumbnail", &SqlType::Text),
        sqlite_column!("track_id", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
        sqlite_column!("started_at", &SqlType::Integer),
        sqlite_column!("completed_at", &SqlType::Integer),
    ],
    indices: &[
        ("idx_jobs_status_created", "status, created_at"),
        ("idx_jobs_user", "user_id"),
    ],
    unique_constraints: &[],
};

pub const DOWNLOAD_QUEUE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[DOWNLOAD_JOBS_TABLE_V1],
    migration: None,
}];
