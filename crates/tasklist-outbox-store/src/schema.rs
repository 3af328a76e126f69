//! SQL statements for the `aggregates` and `outbox_messages` tables.
//!
//! The tables themselves are created by the workspace migrations.

/// Inserts an aggregate snapshot, or replaces the stored one when its version
/// is exactly one below the new version. Affects no row on a version mismatch.
pub const UPSERT_AGGREGATE: &str = r"
INSERT INTO aggregates (aggregate_type, aggregate_id, state, version, updated_at)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (aggregate_type, aggregate_id)
DO UPDATE SET
    state = EXCLUDED.state,
    version = EXCLUDED.version,
    updated_at = EXCLUDED.updated_at
WHERE aggregates.version = EXCLUDED.version - 1
";

/// Loads one aggregate snapshot.
pub const SELECT_AGGREGATE: &str = r"
SELECT aggregate_type, aggregate_id, state, version, updated_at
FROM aggregates
WHERE aggregate_type = $1 AND aggregate_id = $2
";

/// Inserts an outbox row. A row with the same id is left as it is.
pub const INSERT_OUTBOX_MESSAGE: &str = r"
INSERT INTO outbox_messages (id, topic, type, content, processed, occurred_on, processed_on, attempts)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (id) DO NOTHING
";

/// Unprocessed rows among a set of ids.
pub const SELECT_UNPROCESSED_BY_ID: &str = r"
SELECT id, topic, type, content, processed, occurred_on, processed_on, attempts
FROM outbox_messages
WHERE id = ANY($1) AND processed = FALSE
ORDER BY occurred_on
";

/// Flips unprocessed rows to processed.
pub const MARK_PROCESSED: &str = r"
UPDATE outbox_messages
SET processed = TRUE, processed_on = $2
WHERE id = ANY($1) AND processed = FALSE
";

/// Unprocessed rows old enough for redelivery.
pub const SELECT_STALE: &str = r"
SELECT id, topic, type, content, processed, occurred_on, processed_on, attempts
FROM outbox_messages
WHERE processed = FALSE AND occurred_on < $1 AND attempts < $2
ORDER BY occurred_on
LIMIT $3
";

/// Bumps the redelivery attempt counter.
pub const RECORD_ATTEMPT: &str = r"
UPDATE outbox_messages
SET attempts = attempts + 1
WHERE id = ANY($1)
";
