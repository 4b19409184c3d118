//! Table layout for the redb-backed persistence gateway. One table per
//! entity in spec §3, keyed the way each entity is naturally addressed.

use redb::TableDefinition;

pub(crate) const MEMORIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("memories");
pub(crate) const LOOPS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("loops");
pub(crate) const EVENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("timeline_events");
pub(crate) const RELATIONSHIPS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("relationships");
pub(crate) const CONTEXT_FRAMES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("context_frames");
pub(crate) const PATTERNS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("patterns");
pub(crate) const OBSERVATIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("observations");
pub(crate) const FINGERPRINTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("fingerprints");
pub(crate) const PREDICTIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("predictions");
pub(crate) const VECTORS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("vectors");

// ============================================================================
// Deserialization limits (security): bound how large a postcard payload we
// will deserialize from any one record, so a corrupt or maliciously large
// entry can't be used to exhaust memory.
// ============================================================================

pub(crate) const MAX_MEMORY_SIZE: u64 = 5_000_000;
pub(crate) const MAX_LOOP_SIZE: u64 = 200_000;
pub(crate) const MAX_EVENT_SIZE: u64 = 200_000;
pub(crate) const MAX_RELATIONSHIP_SIZE: u64 = 500_000;
pub(crate) const MAX_CONTEXT_FRAME_SIZE: u64 = 500_000;
pub(crate) const MAX_PATTERN_SIZE: u64 = 500_000;
pub(crate) const MAX_OBSERVATION_SIZE: u64 = 200_000;
pub(crate) const MAX_FINGERPRINT_SIZE: u64 = 2_000_000;
pub(crate) const MAX_PREDICTION_SIZE: u64 = 200_000;
pub(crate) const MAX_EMBEDDING_SIZE: u64 = 1_000_000;
