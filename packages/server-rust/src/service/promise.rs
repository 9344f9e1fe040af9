//! The Promise entity (C7): a persisted intent to eventually run a named,
//! idempotent action, plus the in-memory claim state machine that decides
//! when it is legal to try.
//!
//! Field names on the wire (`Promise_Due`, `Promise_AtpCnt`, `Promise_Act`,
//! `Promise_Dta`) are a stable external contract; `Due` is stored as an
//! RFC 3339 UTC string rather than the `_ts` envelope's raw seconds, since it
//! is a domain value a reader may need to eyeball, not a storage timestamp.

use promise_core::{Clock, Id, PartitionKey};

use crate::error::{EngineError, EngineResult};
use crate::service::registry::ActionRegistry;
use crate::storage::document::Document;

/// The window a claimant has to fulfill a promise before another worker may
/// claim it instead.
pub const CLAIM_DURATION_SECONDS: i64 = 60;

/// A persisted intent to run `action_name` with `data`, plus the claim state
/// carried only in memory until the next store round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Promise {
    id: String,
    partition: PartitionKey,
    due_seconds: i64,
    attempt_count: u64,
    action_name: String,
    data: String,
    etag: Option<String>,
    storage_timestamp_seconds: i64,
    available_attempt: bool,
}

impl Promise {
    /// Creates a fresh promise in a newly generated, ambiently-scoped
    /// partition. Fails [`EngineError::UnknownAction`] if `action_name` is
    /// not registered.
    pub fn create(
        registry: &ActionRegistry,
        action_name: &str,
        data: impl Into<String>,
        clock: &dyn Clock,
    ) -> EngineResult<Self> {
        Self::create_in(registry, None, action_name, data, clock)
    }

    /// Creates a fresh promise in the same partition as `entity_partition`,
    /// so a use case's entity and its follow-up promise land in one
    /// transaction's partition scope.
    pub fn create_for_entity(
        registry: &ActionRegistry,
        entity_partition: &PartitionKey,
        action_name: &str,
        data: impl Into<String>,
        clock: &dyn Clock,
    ) -> EngineResult<Self> {
        Self::create_in(registry, Some(entity_partition), action_name, data, clock)
    }

    fn create_in(
        registry: &ActionRegistry,
        entity_partition: Option<&PartitionKey>,
        action_name: &str,
        data: impl Into<String>,
        clock: &dyn Clock,
    ) -> EngineResult<Self> {
        if !registry.contains(action_name) {
            return Err(EngineError::UnknownAction(action_name.to_string()));
        }
        let id = match entity_partition {
            Some(pk) => Id::generate_in_partition(pk),
            None => Id::generate(),
        };
        let partition = PartitionKey::of_id(&id);
        let now_seconds = clock.now_millis() / 1000;
        Ok(Self {
            id: id.as_str().to_string(),
            partition,
            due_seconds: now_seconds + CLAIM_DURATION_SECONDS,
            attempt_count: 1,
            action_name: action_name.to_string(),
            data: data.into(),
            etag: None,
            storage_timestamp_seconds: 0,
            available_attempt: false,
        })
    }

    /// Rebuilds a promise from a loaded document. The instance is treated as
    /// freshly loaded: its one available attempt has not yet been claimed by
    /// this process.
    pub fn from_document(doc: &Document) -> EngineResult<Self> {
        let due_str = doc
            .field_str("Promise_Due")
            .ok_or_else(|| EngineError::InvalidState("promise document missing Promise_Due".to_string()))?;
        let due_seconds = rfc3339::parse(due_str)
            .ok_or_else(|| EngineError::InvalidState(format!("promise document has an unparsable Promise_Due {due_str:?}")))?;
        let attempt_count = doc
            .field_u64("Promise_AtpCnt")
            .ok_or_else(|| EngineError::InvalidState("promise document missing Promise_AtpCnt".to_string()))?;
        let action_name = doc
            .field_str("Promise_Act")
            .ok_or_else(|| EngineError::InvalidState("promise document missing Promise_Act".to_string()))?
            .to_string();
        let data = doc.field_str("Promise_Dta").unwrap_or_default().to_string();
        let partition = PartitionKey::for_string(doc.partition.clone())?;

        Ok(Self {
            id: doc.id.clone(),
            partition,
            due_seconds,
            attempt_count,
            action_name,
            data,
            etag: doc.etag.clone(),
            storage_timestamp_seconds: doc.ts_seconds,
            available_attempt: doc.etag.is_some(),
        })
    }

    /// Serializes this promise to the document shape a transaction writes.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new(self.id.clone(), self.partition.as_str().to_string())
            .with_field("Promise_Due", rfc3339::format(self.due_seconds))
            .with_field("Promise_AtpCnt", self.attempt_count)
            .with_field("Promise_Act", self.action_name.clone())
            .with_field("Promise_Dta", self.data.clone());
        doc.etag.clone_from(&self.etag);
        doc.ts_seconds = self.storage_timestamp_seconds;
        doc
    }

    /// Updates this instance with the etag a transaction commit just
    /// assigned, moving it from "fresh" to "stored, available". Back-fills
    /// only the etag: `storage_timestamp_seconds` (and therefore
    /// [`is_loaded`](Self::is_loaded)) is set only by
    /// [`from_document`](Self::from_document), so a creating transaction's
    /// own commit does not retroactively close off operations — like
    /// [`suppress_immediate_fulfillment`](Self::suppress_immediate_fulfillment)
    /// — that are legal only before the first load from storage.
    pub fn apply_committed(&mut self, committed: &Document) {
        self.etag = committed.etag.clone();
        self.available_attempt = true;
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    #[must_use]
    pub fn due_seconds(&self) -> i64 {
        self.due_seconds
    }

    #[must_use]
    pub fn attempt_count(&self) -> u64 {
        self.attempt_count
    }

    #[must_use]
    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }

    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Whether this instance has ever round-tripped through storage.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.storage_timestamp_seconds != 0
    }

    #[must_use]
    pub fn is_first_attempt(&self) -> bool {
        self.attempt_count == 1
    }

    /// 0 or 1: whether this instance currently holds an attempt nobody has
    /// consumed or suppressed yet.
    #[must_use]
    pub fn available_attempt_count(&self) -> u32 {
        u32::from(self.available_attempt)
    }

    /// Whether there is still enough of the claim window left to attempt
    /// fulfillment: `Due - now >= ClaimDuration / 2`.
    #[must_use]
    pub fn has_time_to_fulfill(&self, now_seconds: i64) -> bool {
        self.due_seconds - now_seconds >= CLAIM_DURATION_SECONDS / 2
    }

    /// Defers this promise's first attempt to the salvager instead of
    /// fulfilling it inline. Legal only on a promise that has never been
    /// loaded from storage — a loaded instance has already been claimed by
    /// some attempt and cannot retroactively suppress that attempt.
    pub fn suppress_immediate_fulfillment(&mut self) -> EngineResult<()> {
        if self.is_loaded() {
            return Err(EngineError::InvalidState(
                "cannot suppress immediate fulfillment on a promise loaded from storage".to_string(),
            ));
        }
        self.available_attempt = false;
        Ok(())
    }

    /// Marks the current attempt as being acted on. Requires an etag (this
    /// instance has round-tripped through storage at least once), an
    /// available attempt, and either enough time left in the claim window or
    /// this being the first attempt (the opportunistic inline-fulfillment
    /// path, which has not yet had a chance to run out of time).
    pub fn consume_attempt(&mut self, now_seconds: i64) -> EngineResult<()> {
        if self.etag.is_none() {
            return Err(EngineError::InvalidState(
                "cannot consume an attempt on a promise with no etag".to_string(),
            ));
        }
        if self.available_attempt_count() == 0 {
            return Err(EngineError::InvalidState(
                "cannot consume an attempt on a promise with no available attempt".to_string(),
            ));
        }
        if !self.has_time_to_fulfill(now_seconds) && !self.is_first_attempt() {
            return Err(EngineError::InvalidState(
                "cannot consume a stale claim past its fulfillment window".to_string(),
            ));
        }
        self.available_attempt = false;
        Ok(())
    }

    /// Advances `Due` by `ClaimDuration` and increments `AttemptCount`,
    /// in memory. Legal only on an instance loaded from storage whose `Due`
    /// has already passed. The caller still has to persist this via an
    /// etag-conditional update; [`available_attempt_count`](Self::available_attempt_count)
    /// only becomes 1 again once that update is reflected via
    /// [`apply_committed`](Self::apply_committed).
    pub fn claim_for_attempt(&mut self, now_seconds: i64) -> EngineResult<()> {
        if !self.is_loaded() {
            return Err(EngineError::InvalidState(
                "cannot claim a promise that was never stored".to_string(),
            ));
        }
        if self.due_seconds > now_seconds {
            return Err(EngineError::InvalidState(
                "cannot claim a promise before its due time".to_string(),
            ));
        }
        self.due_seconds = now_seconds + CLAIM_DURATION_SECONDS;
        self.attempt_count += 1;
        self.available_attempt = false;
        Ok(())
    }
}

/// Reads a promise document's due time without fully deserializing it —
/// used by the salvager to filter/order a batch scan.
#[must_use]
pub(crate) fn due_seconds_of(doc: &Document) -> Option<i64> {
    doc.field_str("Promise_Due").and_then(rfc3339::parse)
}

/// RFC 3339 (UTC, second precision) formatting/parsing for `Promise_Due`,
/// backed by `chrono` for the calendar conversion rather than a hand-rolled
/// one, so an invalid calendar date (e.g. February 30th) is rejected rather
/// than silently accepted.
mod rfc3339 {
    use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

    pub fn format(total_seconds: i64) -> String {
        Utc.timestamp_opt(total_seconds, 0)
            .single()
            .expect("total_seconds is a valid Unix timestamp")
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn parse(s: &str) -> Option<i64> {
        Some(DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc).timestamp())
    }


}
