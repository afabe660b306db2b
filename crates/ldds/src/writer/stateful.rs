// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Reliable delivery engine (RTPS StatefulWriter).
//!
//! Extends the best-effort skeleton with per-reader proxies. Every change is
//! tracked per matched reader through Unsent/Requested/Underway/
//! Unacknowledged/Acknowledged; ACKNACKs advance the acknowledged prefix and
//! request repairs, NACKFRAGs request single fragments, GAPs cover sequence
//! numbers the cache no longer holds. Periodic heartbeats are produced by
//! the send pass and re-armed through the async sender's deadline.
//!
//! History removal: a change leaves the cache only once every matched
//! reader acknowledged it (removal horizon = min over proxies of the
//! acknowledged prefix), unless KEEP_LAST eviction displaced it first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::config::ProtocolConfig;
use crate::core::types::{
    EntityId, Guid, GuidPrefix, Locator, SequenceNumber, ENTITYID_UNKNOWN,
};
use crate::flow::{notify_controllers_sent, run_controllers};
use crate::history::{ChangeInput, HistoryAttributes, WriterHistoryCache};
use crate::listener::WriterListener;
use crate::liveliness::LivelinessAssertions;
use crate::protocol::rtps::{
    AckNackSubmessage, GapSubmessage, HeartbeatSubmessage, NackFragSubmessage,
};
use crate::qos::{Durability, QosProfile};
use crate::security::SecurityPlugin;
use crate::sender::{AsyncSender, AsyncWriter, SendOutcome};
use crate::transport::SenderResourceCache;
use crate::writer::stateless::SharedControllers;
use crate::writer::{
    Collector, CollectorItem, DeliveryMetrics, MatchResult, MatchedReaderRegistry, MessageGroup,
    PublishMode, ReaderAllocation, ReaderProxy, ReaderProxyData, RemoteReader,
};
use crate::{Error, Result};

/// Heartbeat pacing with percentage jitter.
#[derive(Debug)]
struct HeartbeatTiming {
    period: Duration,
    jitter_pct: u8,
    next: Instant,
    seed: u32,
}

impl HeartbeatTiming {
    fn new(period: Duration, jitter_pct: u8) -> Self {
        let mut timing = Self {
            period,
            jitter_pct,
            next: Instant::now(),
            seed: 0x9E37_79B9,
        };
        timing.rearm(Instant::now());
        timing
    }

    fn due(&self, now: Instant) -> bool {
        now >= self.next
    }

    fn rearm(&mut self, now: Instant) {
        self.next = now + self.jittered_period();
    }

    fn jittered_period(&mut self) -> Duration {
        if self.jitter_pct == 0 {
            return self.period;
        }
        // xorshift32: cheap deterministic jitter, no RNG dependency
        let mut x = self.seed;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.seed = x;

        let span = u64::from(self.jitter_pct) * 2 + 1;
        let offset = i64::from((u64::from(x) % span) as u32) - i64::from(self.jitter_pct);
        let factor = (100 + offset).max(1) as u32;
        self.period * factor / 100
    }
}

struct StatefulInner {
    history: WriterHistoryCache,
    registry: MatchedReaderRegistry<ReaderProxy>,
    flow_controllers: Vec<Box<dyn crate::flow::FlowController>>,
    heartbeat: HeartbeatTiming,
    /// Highest sequence number already reported through
    /// `on_writer_change_received_by_all`.
    notified_up_to: SequenceNumber,
}

/// Reliable RTPS writer.
pub struct StatefulWriter {
    guid: Guid,
    durability: Durability,
    config: ProtocolConfig,
    publish_mode: PublishMode,
    resources: Arc<SenderResourceCache>,
    async_sender: Arc<AsyncSender>,
    participant_controllers: SharedControllers,
    listener: ArcSwapOption<Box<dyn WriterListener>>,
    liveliness: ArcSwapOption<Box<dyn LivelinessAssertions>>,
    security: Option<Arc<dyn SecurityPlugin>>,
    metrics: Arc<DeliveryMetrics>,
    inner: Mutex<StatefulInner>,
}

impl StatefulWriter {
    #[allow(clippy::too_many_arguments)] // writer wiring is the participant's job
    pub fn new(
        guid: Guid,
        qos: &QosProfile,
        config: ProtocolConfig,
        publish_mode: PublishMode,
        allocation: ReaderAllocation,
        resources: Arc<SenderResourceCache>,
        async_sender: Arc<AsyncSender>,
        participant_controllers: SharedControllers,
        security: Option<Arc<dyn SecurityPlugin>>,
    ) -> Arc<Self> {
        let heartbeat =
            HeartbeatTiming::new(config.heartbeat_period, config.heartbeat_jitter_pct);
        Arc::new(Self {
            guid,
            durability: qos.durability,
            config,
            publish_mode,
            resources,
            async_sender,
            participant_controllers,
            listener: ArcSwapOption::empty(),
            liveliness: ArcSwapOption::empty(),
            security,
            metrics: Arc::new(DeliveryMetrics::new()),
            inner: Mutex::new(StatefulInner {
                history: WriterHistoryCache::new(guid, HistoryAttributes::from(qos)),
                registry: MatchedReaderRegistry::new(allocation),
                flow_controllers: Vec::new(),
                heartbeat,
                notified_up_to: 0,
            }),
        })
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    #[must_use]
    pub fn metrics(&self) -> &DeliveryMetrics {
        &self.metrics
    }

    pub fn set_listener(&self, listener: Option<Box<dyn WriterListener>>) {
        self.listener.store(listener.map(Arc::new));
    }

    pub fn set_liveliness_hook(&self, hook: Box<dyn LivelinessAssertions>) {
        self.liveliness.store(Some(Arc::new(hook)));
    }

    /// Attach a writer-local flow controller (runs before participant ones).
    pub fn add_flow_controller(&self, controller: Box<dyn crate::flow::FlowController>) {
        self.inner.lock().flow_controllers.push(controller);
    }

    /// Submit a change: store in history, track per reader, dispatch.
    pub fn write(&self, input: ChangeInput) -> Result<SequenceNumber> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let sn = inner.history.add_change(input)?;
        let total_fragments = inner
            .history
            .get(sn)
            .map(|c| c.total_fragments())
            .unwrap_or(0);

        if inner.registry.is_empty() {
            // Nobody to deliver to: the change is trivially acknowledged.
            let delivered = self.sweep_acknowledgments(inner);
            drop(guard);
            self.notify_received_by_all(&delivered);
            return Ok(sn);
        }

        match self.publish_mode {
            PublishMode::Synchronous => {
                inner
                    .registry
                    .for_each_mut(|p| p.on_change_added(sn, total_fragments, true));
                match self.send_change_synchronously(inner, sn) {
                    Ok(()) => {
                        inner.registry.for_each_mut(ReaderProxy::settle_underway);
                        drop(guard);
                        self.assert_liveliness();
                        Ok(sn)
                    }
                    Err(e) => {
                        // The change stays in history; the next heartbeat
                        // triggers the reader-side repair dialogue.
                        inner.registry.for_each_mut(ReaderProxy::requeue_underway);
                        let heartbeat = inner.heartbeat.next;
                        drop(guard);
                        self.async_sender.wake_up(self.guid, Some(heartbeat));
                        Err(e)
                    }
                }
            }
            PublishMode::Asynchronous => {
                inner
                    .registry
                    .for_each_mut(|p| p.on_change_added(sn, total_fragments, false));
                drop(guard);
                self.async_sender.wake_up(
                    self.guid,
                    Some(Instant::now() + self.config.max_blocking_time),
                );
                Ok(sn)
            }
        }
    }

    /// Discovery match: add or update a remote reader.
    pub fn matched_reader_add(&self, data: &ReaderProxyData) -> MatchResult {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let result = inner.registry.add(data, &self.resources);
        if result == MatchResult::Rejected {
            return result;
        }

        if result == MatchResult::Added {
            let max_sn = inner.history.max_sn().unwrap_or(0);
            let seed: Vec<(SequenceNumber, u32)> = if data.durability >= Durability::TransientLocal
            {
                inner
                    .history
                    .iter()
                    .map(|c| (c.sequence_number, c.total_fragments()))
                    .collect()
            } else {
                Vec::new()
            };

            if let Some(proxy) = inner.registry.get_mut(data.guid) {
                if seed.is_empty() {
                    proxy.advance_acked_to(max_sn);
                } else {
                    log::debug!(
                        "[StatefulWriter] Seeding late joiner {} with {} changes",
                        data.guid,
                        seed.len()
                    );
                    for (sn, fragments) in seed {
                        proxy.on_change_added(sn, fragments, false);
                    }
                }
            }
        }

        let heartbeat = inner.heartbeat.next;
        drop(guard);
        // Arm the periodic dialogue; a seeded proxy gets drained immediately.
        self.async_sender.wake_up(self.guid, Some(heartbeat.min(Instant::now())));
        result
    }

    /// Discovery unmatch: drain the proxy; its pending changes no longer
    /// hold back the removal horizon.
    pub fn matched_reader_remove(&self, guid: Guid) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.registry.remove(guid).is_none() {
            log::debug!("[StatefulWriter] matched_reader_remove: {} not matched", guid);
            return false;
        }
        let delivered = self.sweep_acknowledgments(inner);
        drop(guard);
        self.notify_received_by_all(&delivered);
        true
    }

    #[must_use]
    pub fn matched_reader_is_matched(&self, guid: Guid) -> bool {
        self.inner.lock().registry.contains(guid)
    }

    /// Whether every matched reader has acknowledged `sn`.
    #[must_use]
    pub fn is_acked_by_all(&self, sn: SequenceNumber) -> bool {
        let inner = self.inner.lock();
        let result = inner.registry.iter().all(|p| p.is_acked(sn));
        result
    }

    /// Handle an ACKNACK from `src_prefix`/`msg.reader_id`.
    ///
    /// Returns `false` when no such reader is matched.
    pub fn on_acknack(&self, src_prefix: GuidPrefix, msg: &AckNackSubmessage) -> bool {
        let reader_guid = Guid::new(src_prefix, msg.reader_id);
        let now = Instant::now();

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(proxy) = inner.registry.get_mut(reader_guid) else {
            log::debug!("[StatefulWriter] ACKNACK from unmatched reader {}", reader_guid);
            return false;
        };

        if proxy.acknack_suppressed(now) {
            log::trace!(
                "[StatefulWriter] ACKNACK from {} inside suppression window, ignored",
                reader_guid
            );
            self.metrics.record_acknack_suppressed();
            return true;
        }
        if !proxy.accept_acknack(msg.count) {
            log::trace!("[StatefulWriter] Stale ACKNACK count {} from {}", msg.count, reader_guid);
            return true;
        }
        self.metrics.record_acknack_received();

        proxy.acknowledge_up_to(msg.reader_sn_state.base());

        let mut repair = false;
        let mut missing: Vec<SequenceNumber> = Vec::new();
        for sn in msg.reader_sn_state.iter() {
            if inner.history.get(sn).is_some() {
                repair |= proxy.mark_requested(sn);
            } else {
                proxy.forget_change(sn);
                missing.push(sn);
            }
        }

        let gap_target = (!missing.is_empty()).then(|| directed_target(proxy));

        if let Some(target) = gap_target {
            self.send_gaps(&target, &missing, now + self.config.max_blocking_time);
        }

        let delivered = self.sweep_acknowledgments(inner);
        drop(guard);

        if repair {
            // Coalesce bursts of ACKNACKs into one repair pass.
            self.async_sender.wake_up(
                self.guid,
                Some(now + self.config.nack_supression_duration),
            );
        }
        self.notify_received_by_all(&delivered);
        true
    }

    /// Handle a NACKFRAG: re-queue the named fragments for that reader.
    pub fn on_nackfrag(&self, src_prefix: GuidPrefix, msg: &NackFragSubmessage) -> bool {
        let reader_guid = Guid::new(src_prefix, msg.reader_id);
        let now = Instant::now();

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(proxy) = inner.registry.get_mut(reader_guid) else {
            log::debug!("[StatefulWriter] NACKFRAG from unmatched reader {}", reader_guid);
            return false;
        };
        if !proxy.accept_nackfrag(msg.count) {
            return true;
        }
        self.metrics.record_nackfrag_received();

        if inner.history.get(msg.writer_sn).is_some() {
            proxy.mark_fragments_requested(msg.writer_sn, msg.fragment_number_state.iter());
            drop(guard);
            self.async_sender.wake_up(
                self.guid,
                Some(now + self.config.nack_supression_duration),
            );
        } else {
            proxy.forget_change(msg.writer_sn);
            let target = directed_target(proxy);
            self.send_gaps(&target, &[msg.writer_sn], now + self.config.max_blocking_time);
        }
        true
    }

    // ------------------------------------------------------------------
    // Send paths
    // ------------------------------------------------------------------

    /// Combined synchronous dispatch with piggybacked final heartbeats.
    fn send_change_synchronously(&self, inner: &mut StatefulInner, sn: SequenceNumber) -> Result<()> {
        let deadline = Instant::now() + self.config.max_blocking_time;
        let transport = Arc::clone(self.resources.transport());
        let inline_qos_expected = inner.registry.iter().any(RemoteReader::expects_inline_qos);

        let change = inner
            .history
            .get(sn)
            .ok_or_else(|| Error::InvalidState(format!("change {} missing from history", sn)))?;

        let mut group = MessageGroup::new(
            transport.as_ref(),
            &self.guid.prefix,
            inner.registry.send_locators(),
            deadline,
        )
        .with_security(self.security.as_deref());

        if change.is_fragmented() {
            for fragment in 1..=change.total_fragments() {
                group.add_data_frag(change, fragment, ENTITYID_UNKNOWN, inline_qos_expected)?;
            }
        } else {
            group.add_data(change, ENTITYID_UNKNOWN, inline_qos_expected)?;
        }

        let first_sn = inner.history.min_sn().unwrap_or(sn);
        let last_sn = inner.history.max_sn().unwrap_or(sn);
        for proxy in inner.registry.iter_mut() {
            let heartbeat = HeartbeatSubmessage {
                reader_id: proxy.guid().entity_id,
                writer_id: self.guid.entity_id,
                first_sn,
                last_sn,
                count: proxy.next_heartbeat_count(),
                final_flag: true,
            };
            group.add_info_destination(proxy.guid().prefix)?;
            group.add_heartbeat(&heartbeat)?;
            self.metrics.record_heartbeat_sent();
        }

        group.flush().map_err(|e| self.note_send_error(e))?;

        if change.is_fragmented() {
            self.metrics
                .record_data_frag_sent(u64::from(change.total_fragments()));
        } else {
            self.metrics.record_data_sent(1);
        }
        Ok(())
    }

    /// One bounded pass: pending DATA/DATA_FRAG per reader, GAPs for evicted
    /// changes, due periodic heartbeats; computes the next wake deadline.
    fn run_send_pass(&self) -> SendOutcome {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.registry.is_empty() {
            return SendOutcome::idle();
        }

        // ---- collect pending work and evicted-change gaps -------------
        let mut collector = Collector::new();
        let mut gap_work: Vec<(DirectedTarget, Vec<SequenceNumber>)> = Vec::new();
        {
            let history = &inner.history;
            for proxy in inner.registry.iter_mut() {
                let reader = proxy.guid();
                let mut missing: Vec<SequenceNumber> = Vec::new();
                for (sn, fragments) in proxy.pending_sends() {
                    match history.get(sn) {
                        Some(change) if change.is_fragmented() => {
                            for fragment in fragments {
                                collector.add_fragment(
                                    sn,
                                    fragment,
                                    Some(reader),
                                    usize::from(change.fragment_size()),
                                );
                            }
                        }
                        Some(change) => {
                            collector.add_change(sn, Some(reader), change.payload().len());
                        }
                        None => missing.push(sn),
                    }
                }
                if !missing.is_empty() {
                    for sn in &missing {
                        proxy.forget_change(*sn);
                    }
                    gap_work.push((directed_target(proxy), missing));
                }
            }
        }

        // ---- flow control ---------------------------------------------
        let mut release = run_controllers(&mut inner.flow_controllers, &mut collector);
        {
            let mut participant = self.participant_controllers.lock();
            release = earliest(release, run_controllers(&mut participant, &mut collector));
        }

        // ---- per-reader dispatch --------------------------------------
        let transport = Arc::clone(self.resources.transport());
        let deadline = now + self.config.max_blocking_time;
        let mut timed_out = false;
        let mut data_sent = false;

        let per_reader = partition_by_reader(&mut collector);
        for (reader, items) in per_reader {
            if timed_out {
                break;
            }
            let Some(proxy) = inner.registry.get_mut(reader) else {
                continue;
            };
            let target = directed_target(proxy);
            let expects_inline_qos = proxy.expects_inline_qos();

            let mut group = MessageGroup::new(
                transport.as_ref(),
                &self.guid.prefix,
                target.destinations.clone(),
                deadline,
            )
            .with_security(self.security.as_deref());
            if group.add_info_destination(target.prefix).is_err() {
                continue;
            }

            let mut queued: Vec<CollectorItem> = Vec::new();
            for item in items {
                let Some(change) = inner.history.get(item.sequence_number) else {
                    continue;
                };
                let result = if item.fragment_number == 0 {
                    group.add_data(change, target.entity_id, expects_inline_qos)
                } else {
                    group.add_data_frag(
                        change,
                        item.fragment_number,
                        target.entity_id,
                        expects_inline_qos,
                    )
                };
                match result {
                    Ok(()) => queued.push(item),
                    Err(Error::WriteTimeout) => {
                        timed_out = true;
                        break;
                    }
                    Err(e) => {
                        log::error!(
                            "[StatefulWriter] Error sending change {} to {}: {}",
                            item.sequence_number,
                            reader,
                            e
                        );
                    }
                }
            }

            match group.flush() {
                Ok(()) => {
                    for item in &queued {
                        if item.fragment_number == 0 {
                            proxy.mark_underway(item.sequence_number);
                            self.metrics.record_data_sent(1);
                        } else {
                            proxy.mark_fragment_sent(item.sequence_number, item.fragment_number);
                            self.metrics.record_data_frag_sent(1);
                        }
                        notify_controllers_sent(&mut inner.flow_controllers, item.size_bytes);
                        notify_controllers_sent(
                            &mut self.participant_controllers.lock(),
                            item.size_bytes,
                        );
                    }
                    proxy.settle_underway();
                    data_sent = !queued.is_empty() || data_sent;
                }
                Err(e) => {
                    self.note_send_error(e);
                    timed_out = true;
                }
            }
        }

        // ---- gaps for changes no longer in history --------------------
        for (target, sns) in gap_work {
            self.send_gaps(&target, &sns, deadline);
        }

        // ---- periodic heartbeats --------------------------------------
        if inner.heartbeat.due(now) {
            self.send_periodic_heartbeats(inner, deadline);
            inner.heartbeat.rearm(now);
        }

        // ---- outcome ---------------------------------------------------
        let heartbeat_next = inner.heartbeat.next;
        let remaining = timed_out || inner.registry.iter().any(ReaderProxy::has_pending_sends);
        drop(guard);

        if data_sent {
            self.assert_liveliness();
        }

        if remaining {
            let retry = if timed_out {
                earliest(release, Some(now + self.config.max_blocking_time))
            } else {
                release
            };
            SendOutcome::backlog(Some(
                retry.unwrap_or(heartbeat_next).min(heartbeat_next),
            ))
        } else {
            SendOutcome::rearm(heartbeat_next)
        }
    }

    /// One directed HEARTBEAT per matched reader.
    fn send_periodic_heartbeats(&self, inner: &mut StatefulInner, deadline: Instant) {
        let history_empty = inner.history.is_empty();
        let first_sn = inner.history.min_sn().unwrap_or_else(|| inner.history.next_sn());
        let last_sn = inner.history.max_sn().unwrap_or_else(|| inner.history.next_sn() - 1);
        let transport = Arc::clone(self.resources.transport());

        for proxy in inner.registry.iter_mut() {
            if history_empty && !proxy.has_unacked() {
                continue;
            }
            let final_flag = !proxy.has_unacked();
            let target = directed_target(proxy);
            let heartbeat = HeartbeatSubmessage {
                reader_id: target.entity_id,
                writer_id: self.guid.entity_id,
                first_sn,
                last_sn,
                count: proxy.next_heartbeat_count(),
                final_flag,
            };

            let mut group = MessageGroup::new(
                transport.as_ref(),
                &self.guid.prefix,
                target.destinations,
                deadline,
            )
            .with_security(self.security.as_deref());
            let sent = group
                .add_info_destination(target.prefix)
                .and_then(|()| group.add_heartbeat(&heartbeat))
                .and_then(|()| group.flush());
            match sent {
                Ok(()) => {
                    self.metrics.record_heartbeat_sent();
                    if !final_flag {
                        proxy.note_heartbeat_sent(self.config.nack_response_delay);
                    }
                }
                Err(e) => {
                    log::debug!("[StatefulWriter] Heartbeat to {} failed: {}", proxy.guid(), e);
                }
            }
        }
    }

    /// Directed GAP submessages for sequence numbers we cannot retransmit.
    fn send_gaps(&self, target: &DirectedTarget, sns: &[SequenceNumber], deadline: Instant) {
        if sns.is_empty() {
            return;
        }
        let transport = Arc::clone(self.resources.transport());
        let mut group = MessageGroup::new(
            transport.as_ref(),
            &self.guid.prefix,
            target.destinations.clone(),
            deadline,
        )
        .with_security(self.security.as_deref());

        let mut result = group.add_info_destination(target.prefix);
        if result.is_ok() {
            for (start, end) in contiguous_runs(sns) {
                let Some(gap) =
                    GapSubmessage::contiguous(target.entity_id, self.guid.entity_id, start, end)
                else {
                    continue;
                };
                result = group.add_gap(&gap);
                if result.is_err() {
                    break;
                }
                self.metrics.record_gap_sent();
            }
        }
        if let Err(e) = result.and_then(|()| group.flush()) {
            log::debug!("[StatefulWriter] GAP dispatch failed: {}", e);
        }
    }

    // ------------------------------------------------------------------
    // Acknowledgment bookkeeping
    // ------------------------------------------------------------------

    /// Advance the removal horizon and collect newly delivered changes.
    fn sweep_acknowledgments(&self, inner: &mut StatefulInner) -> Vec<SequenceNumber> {
        let horizon = inner
            .registry
            .iter()
            .map(ReaderProxy::highest_acked)
            .min()
            .unwrap_or_else(|| inner.history.max_sn().unwrap_or(0));

        let mut delivered = Vec::new();
        if horizon > inner.notified_up_to {
            for sn in (inner.notified_up_to + 1)..=horizon {
                if inner.history.get(sn).is_some() {
                    delivered.push(sn);
                    self.metrics.record_change_acknowledged();
                }
            }
            inner.notified_up_to = horizon;
        }

        // Volatile writers free acknowledged history immediately; durable
        // ones keep it for late joiners (depth-bounded by KEEP_LAST).
        if self.durability == Durability::Volatile && horizon > 0 {
            let removed = inner.history.remove_up_to(horizon);
            if removed > 0 {
                log::trace!(
                    "[StatefulWriter] Released {} acknowledged changes up to {}",
                    removed,
                    horizon
                );
            }
        }
        delivered
    }

    fn notify_received_by_all(&self, sns: &[SequenceNumber]) {
        if sns.is_empty() {
            return;
        }
        if let Some(listener) = self.listener.load_full() {
            for sn in sns {
                listener.on_writer_change_received_by_all(self.guid, *sn);
            }
        }
    }

    fn assert_liveliness(&self) {
        if let Some(hook) = self.liveliness.load_full() {
            hook.assert_writer_liveliness(self.guid);
        }
    }

    /// Relay a WLP transition for this writer to its listener.
    pub(crate) fn notify_liveliness(&self, alive: bool) {
        if let Some(listener) = self.listener.load_full() {
            if alive {
                listener.on_liveliness_recovered(self.guid);
            } else {
                listener.on_liveliness_lost(self.guid);
            }
        }
    }

    fn note_send_error(&self, e: Error) -> Error {
        if matches!(e, Error::WriteTimeout) {
            log::debug!("[StatefulWriter] Max blocking time reached");
            self.metrics.record_send_timeout();
        } else {
            log::error!("[StatefulWriter] Send failed: {}", e);
        }
        e
    }

    #[cfg(test)]
    pub(crate) fn history_len(&self) -> usize {
        self.inner.lock().history.len()
    }

    #[cfg(test)]
    pub(crate) fn history_contains(&self, sn: SequenceNumber) -> bool {
        self.inner.lock().history.get(sn).is_some()
    }
}

impl AsyncWriter for StatefulWriter {
    fn guid(&self) -> Guid {
        self.guid
    }

    fn send_any_unsent_changes(&self) -> SendOutcome {
        self.run_send_pass()
    }
}

/// Where to aim a directed submessage burst for one reader.
struct DirectedTarget {
    prefix: GuidPrefix,
    entity_id: EntityId,
    destinations: Vec<Locator>,
}

fn directed_target(proxy: &ReaderProxy) -> DirectedTarget {
    let destinations = if proxy.unicast_locators().is_empty() {
        proxy.multicast_locators().to_vec()
    } else {
        proxy.unicast_locators().to_vec()
    };
    DirectedTarget {
        prefix: proxy.guid().prefix,
        entity_id: proxy.guid().entity_id,
        destinations,
    }
}

/// Drain the collector into per-reader item lists, preserving SN order.
fn partition_by_reader(collector: &mut Collector) -> Vec<(Guid, Vec<CollectorItem>)> {
    let mut per_reader: Vec<(Guid, Vec<CollectorItem>)> = Vec::new();
    while let Some(item) = collector.pop() {
        let reader = item.reader_guid.unwrap_or(Guid::UNKNOWN);
        if let Some((_, items)) = per_reader.iter_mut().find(|(g, _)| *g == reader) {
            items.push(item);
        } else {
            per_reader.push((reader, vec![item]));
        }
    }
    per_reader
}

/// Split sorted sequence numbers into contiguous `[start, end)` runs.
fn contiguous_runs(sns: &[SequenceNumber]) -> Vec<(SequenceNumber, SequenceNumber)> {
    let mut sorted: Vec<SequenceNumber> = sns.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut runs = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return runs;
    };
    let mut start = first;
    let mut prev = first;
    for sn in iter {
        if sn == prev + 1 {
            prev = sn;
        } else {
            runs.push((start, prev + 1));
            start = sn;
            prev = sn;
        }
    }
    runs.push((start, prev + 1));
    runs
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, y) => x.or(y),
    }
}
