// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Writer history cache.
//!
//! Ordered store of cache changes identified by monotonically increasing
//! sequence numbers. Enforces the history QoS (KEEP_LAST eviction, KEEP_ALL
//! rejection), resource limits and the memory policy. The cache is not
//! internally locked; all access is serialized by the owning writer.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::types::{
    ChangeKind, FragmentNumber, Guid, InstanceHandle, SequenceNumber, SEQUENCE_NUMBER_MIN,
};
use crate::qos::{History, MemoryPolicy, QosProfile, ResourceLimits, LENGTH_UNLIMITED};
use crate::{Error, Result};

/// One published sample with its protocol metadata.
///
/// Once placed in the cache the sequence number is final, the payload is
/// immutable and the kind may not change.
#[derive(Debug, Clone)]
pub struct CacheChange {
    /// GUID of the writer that produced the change.
    pub writer_guid: Guid,
    /// Sequence number assigned by the history cache.
    pub sequence_number: SequenceNumber,
    /// Lifecycle kind.
    pub kind: ChangeKind,
    /// Instance key hash (0 = unkeyed).
    pub instance_handle: InstanceHandle,
    /// Source timestamp, nanoseconds since the UNIX epoch.
    pub source_timestamp_ns: u64,
    /// Optional inline-QoS parameter list (must terminate with the sentinel).
    pub inline_qos: Option<Vec<u8>>,
    payload: Vec<u8>,
    fragment_size: u16,
    total_fragments: u32,
}

impl CacheChange {
    /// Serialized payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Fragment size in bytes; 0 means the change is not fragmented.
    #[must_use]
    pub fn fragment_size(&self) -> u16 {
        self.fragment_size
    }

    /// Number of fragments (0 for unfragmented changes).
    #[must_use]
    pub fn total_fragments(&self) -> u32 {
        self.total_fragments
    }

    #[must_use]
    pub fn is_fragmented(&self) -> bool {
        self.fragment_size > 0
    }

    /// Payload slice for the 1-based fragment number.
    #[must_use]
    pub fn fragment(&self, number: FragmentNumber) -> Option<&[u8]> {
        if !self.is_fragmented() || number == 0 || number > self.total_fragments {
            return None;
        }
        let size = usize::from(self.fragment_size);
        let start = (number as usize - 1) * size;
        let end = (start + size).min(self.payload.len());
        Some(&self.payload[start..end])
    }
}

/// Input to [`WriterHistoryCache::add_change`]; the cache assigns the
/// sequence number and stamps missing metadata.
#[derive(Debug, Clone, Default)]
pub struct ChangeInput {
    pub kind: ChangeKind,
    pub instance_handle: InstanceHandle,
    /// Explicit source timestamp; `None` stamps the current time.
    pub source_timestamp_ns: Option<u64>,
    pub inline_qos: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    /// 0 disables fragmentation.
    pub fragment_size: u16,
}

impl ChangeInput {
    /// Plain ALIVE data sample for the default instance.
    #[must_use]
    pub fn data(payload: Vec<u8>) -> Self {
        Self {
            payload,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ChangeKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_instance(mut self, instance_handle: InstanceHandle) -> Self {
        self.instance_handle = instance_handle;
        self
    }

    #[must_use]
    pub fn with_inline_qos(mut self, inline_qos: Vec<u8>) -> Self {
        self.inline_qos = Some(inline_qos);
        self
    }

    #[must_use]
    pub fn with_fragment_size(mut self, fragment_size: u16) -> Self {
        self.fragment_size = fragment_size;
        self
    }

    #[must_use]
    pub fn with_source_timestamp_ns(mut self, nanos: u64) -> Self {
        self.source_timestamp_ns = Some(nanos);
        self
    }
}

/// Per-history attributes derived from the QoS profile.
#[derive(Debug, Clone)]
pub struct HistoryAttributes {
    pub history: History,
    pub resource_limits: ResourceLimits,
    pub memory_policy: MemoryPolicy,
}

impl From<&QosProfile> for HistoryAttributes {
    fn from(qos: &QosProfile) -> Self {
        Self {
            history: qos.history,
            resource_limits: qos.resource_limits,
            memory_policy: qos.memory_policy,
        }
    }
}

/// Ordered writer history with QoS-driven eviction.
pub struct WriterHistoryCache {
    writer_guid: Guid,
    attrs: HistoryAttributes,
    changes: VecDeque<CacheChange>,
    next_sn: SequenceNumber,
    /// Hard slot bound for `MemoryPolicy::Preallocated`.
    fixed_capacity: Option<usize>,
}

impl WriterHistoryCache {
    /// Preallocation cap when max_samples is unbounded but the memory policy
    /// demands fixed storage.
    const PREALLOC_DEFAULT: usize = 4096;

    #[must_use]
    pub fn new(writer_guid: Guid, attrs: HistoryAttributes) -> Self {
        let prealloc = match attrs.memory_policy {
            MemoryPolicy::Dynamic => 0,
            MemoryPolicy::Preallocated | MemoryPolicy::PreallocatedWithRealloc => {
                if attrs.resource_limits.max_samples == LENGTH_UNLIMITED {
                    Self::PREALLOC_DEFAULT
                } else {
                    attrs.resource_limits.max_samples
                }
            }
        };
        let fixed_capacity = matches!(attrs.memory_policy, MemoryPolicy::Preallocated)
            .then_some(prealloc.max(1));

        Self {
            writer_guid,
            attrs,
            changes: VecDeque::with_capacity(prealloc),
            next_sn: SEQUENCE_NUMBER_MIN,
            fixed_capacity,
        }
    }

    /// Insert a new change, assigning the next sequence number.
    ///
    /// Returns the assigned sequence number. Rejections: KEEP_ALL overflow
    /// (`Error::WouldBlock`), instance/resource limits
    /// (`Error::ResourceLimitExceeded`), preallocated storage exhausted
    /// (`Error::ResourceLimitExceeded`).
    pub fn add_change(&mut self, input: ChangeInput) -> Result<SequenceNumber> {
        self.admit(input.instance_handle)?;

        let sn = self.next_sn;
        let fragment_size = input.fragment_size;
        let total_fragments = if fragment_size == 0 {
            0
        } else {
            input.payload.len().div_ceil(usize::from(fragment_size)) as u32
        };

        let change = CacheChange {
            writer_guid: self.writer_guid,
            sequence_number: sn,
            kind: input.kind,
            instance_handle: input.instance_handle,
            source_timestamp_ns: input.source_timestamp_ns.unwrap_or_else(now_ns),
            inline_qos: input.inline_qos,
            payload: input.payload,
            fragment_size,
            total_fragments,
        };

        self.insert(change)?;
        Ok(sn)
    }

    /// Remove a single change by sequence number.
    pub fn remove_change(&mut self, sn: SequenceNumber) -> bool {
        if let Some(pos) = self.changes.iter().position(|c| c.sequence_number == sn) {
            self.changes.remove(pos);
            true
        } else {
            false
        }
    }

    /// Remove every change with `sequence_number <= sn`.
    ///
    /// Used by the reliable engine once all matched readers acknowledged a
    /// prefix. Returns the number of changes removed.
    pub fn remove_up_to(&mut self, sn: SequenceNumber) -> usize {
        let mut removed = 0;
        while let Some(front) = self.changes.front() {
            if front.sequence_number <= sn {
                self.changes.pop_front();
                removed += 1;
            } else {
                break;
            }
        }
        removed
    }

    /// Look up a change by sequence number.
    #[must_use]
    pub fn get(&self, sn: SequenceNumber) -> Option<&CacheChange> {
        // Changes are SN-ordered; front offset gives O(1) access for the
        // common contiguous case.
        let front_sn = self.changes.front()?.sequence_number;
        if sn < front_sn {
            return None;
        }
        let guess = usize::try_from(sn - front_sn).ok()?;
        match self.changes.get(guess) {
            Some(c) if c.sequence_number == sn => Some(c),
            _ => self
                .changes
                .iter()
                .find(|c| c.sequence_number == sn),
        }
    }

    /// Iterate all changes in sequence-number order.
    pub fn iter(&self) -> impl Iterator<Item = &CacheChange> {
        self.changes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Oldest sequence number still cached.
    #[must_use]
    pub fn min_sn(&self) -> Option<SequenceNumber> {
        self.changes.front().map(|c| c.sequence_number)
    }

    /// Newest sequence number cached.
    #[must_use]
    pub fn max_sn(&self) -> Option<SequenceNumber> {
        self.changes.back().map(|c| c.sequence_number)
    }

    /// Next sequence number that will be assigned.
    #[must_use]
    pub fn next_sn(&self) -> SequenceNumber {
        self.next_sn
    }

    /// Count distinct instance keys currently cached.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        let mut keys: Vec<InstanceHandle> = Vec::new();
        for change in &self.changes {
            if !keys.contains(&change.instance_handle) {
                keys.push(change.instance_handle);
            }
        }
        keys.len()
    }

    /// Count samples cached for one instance.
    #[must_use]
    pub fn samples_for_instance(&self, instance: InstanceHandle) -> usize {
        self.changes
            .iter()
            .filter(|c| c.instance_handle == instance)
            .count()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// Run admission control and KEEP_LAST eviction for one incoming change.
    fn admit(&mut self, instance: InstanceHandle) -> Result<()> {
        let limits = self.attrs.resource_limits;

        match self.attrs.history {
            History::KeepAll => {
                if self.changes.len() + 1 > limits.max_samples {
                    return Err(Error::WouldBlock);
                }
                if self.would_exceed_instance_limits(instance) {
                    return Err(Error::WouldBlock);
                }
            }
            History::KeepLast(depth) => {
                // Depth applies per instance: displace the oldest sample of
                // this instance first.
                if self.samples_for_instance(instance) >= depth as usize {
                    self.evict_oldest_of_instance(instance);
                }
                if limits.max_samples_per_instance != LENGTH_UNLIMITED
                    && self.samples_for_instance(instance) >= limits.max_samples_per_instance
                {
                    self.evict_oldest_of_instance(instance);
                }
                if limits.max_instances != LENGTH_UNLIMITED
                    && self.samples_for_instance(instance) == 0
                    && self.instance_count() >= limits.max_instances
                {
                    self.evict_oldest_instance();
                }
                if limits.max_samples != LENGTH_UNLIMITED
                    && self.changes.len() + 1 > limits.max_samples
                {
                    if !self.evict_oldest_of_instance(instance) {
                        self.changes.pop_front();
                    }
                }
            }
        }

        if let Some(capacity) = self.fixed_capacity {
            if self.changes.len() >= capacity {
                return Err(Error::ResourceLimitExceeded(format!(
                    "preallocated history full ({capacity} slots)"
                )));
            }
        }

        Ok(())
    }

    /// Insert a fully formed change, enforcing SN monotonicity.
    pub(crate) fn insert(&mut self, change: CacheChange) -> Result<()> {
        if let Some(max) = self.max_sn() {
            if change.sequence_number <= max {
                return Err(Error::InvalidState(format!(
                    "duplicate or out-of-order sequence number {} (max is {})",
                    change.sequence_number, max
                )));
            }
        }
        self.next_sn = change.sequence_number + 1;
        self.changes.push_back(change);
        Ok(())
    }

    fn would_exceed_instance_limits(&self, instance: InstanceHandle) -> bool {
        let limits = self.attrs.resource_limits;

        if limits.max_instances != LENGTH_UNLIMITED
            && self.samples_for_instance(instance) == 0
            && self.instance_count() >= limits.max_instances
        {
            return true;
        }

        limits.max_samples_per_instance != LENGTH_UNLIMITED
            && self.samples_for_instance(instance) >= limits.max_samples_per_instance
    }

    fn evict_oldest_of_instance(&mut self, instance: InstanceHandle) -> bool {
        if let Some(pos) = self
            .changes
            .iter()
            .position(|c| c.instance_handle == instance)
        {
            self.changes.remove(pos);
            true
        } else {
            false
        }
    }

    /// Drop all samples of the instance holding the oldest cached change.
    fn evict_oldest_instance(&mut self) {
        let Some(oldest) = self.changes.front().map(|c| c.instance_handle) else {
            return;
        };
        log::debug!(
            "[WriterHistoryCache] max_instances reached, evicting instance {:#x}",
            oldest
        );
        self.changes.retain(|c| c.instance_handle != oldest);
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_else(|_| {
            log::debug!("[WriterHistoryCache] System time before UNIX epoch, using 0");
            0
        })
}
