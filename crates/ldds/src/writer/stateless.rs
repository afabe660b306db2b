// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Best-effort delivery engine.
//!
//! Fire-and-forget: no per-reader state beyond destinations. Synchronous
//! writers build a message group on the writing thread (combined fan-out or
//! one group per reader when separate sending is on); asynchronous writers
//! queue into `unsent` and let the async sender drain through the flow
//! controllers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::config::ProtocolConfig;
use crate::core::types::{FragmentNumber, Guid, Locator, SequenceNumber, ENTITYID_UNKNOWN};
use crate::flow::{notify_controllers_sent, run_controllers, FlowController};
use crate::history::{ChangeInput, HistoryAttributes, WriterHistoryCache};
use crate::listener::WriterListener;
use crate::liveliness::LivelinessAssertions;
use crate::qos::{Durability, QosProfile};
use crate::security::SecurityPlugin;
use crate::sender::{AsyncSender, AsyncWriter, SendOutcome};
use crate::transport::SenderResourceCache;
use crate::writer::{
    Collector, DeliveryMetrics, MatchResult, MatchedReaderRegistry, MessageGroup, PublishMode,
    ReaderAllocation, ReaderLocatorEntry, ReaderProxyData, RemoteReader,
};
use crate::{Error, Result};

/// Shared list of participant-level flow controllers.
pub type SharedControllers = Arc<Mutex<Vec<Box<dyn FlowController>>>>;

struct UnsentChange {
    sn: SequenceNumber,
    /// Fragments still to send; empty means one whole DATA.
    pending_fragments: Vec<FragmentNumber>,
}

struct StatelessInner {
    history: WriterHistoryCache,
    registry: MatchedReaderRegistry<ReaderLocatorEntry>,
    unsent: VecDeque<UnsentChange>,
    flow_controllers: Vec<Box<dyn FlowController>>,
    /// True when any matched reader expects inline QoS (combined mode).
    inline_qos_expected: bool,
}

/// Best-effort RTPS writer.
pub struct StatelessWriter {
    guid: Guid,
    config: ProtocolConfig,
    publish_mode: PublishMode,
    separate_sending: bool,
    resources: Arc<SenderResourceCache>,
    async_sender: Arc<AsyncSender>,
    participant_controllers: SharedControllers,
    listener: ArcSwapOption<Box<dyn WriterListener>>,
    liveliness: ArcSwapOption<Box<dyn LivelinessAssertions>>,
    security: Option<Arc<dyn SecurityPlugin>>,
    metrics: Arc<DeliveryMetrics>,
    inner: Mutex<StatelessInner>,
}

impl StatelessWriter {
    #[allow(clippy::too_many_arguments)] // writer wiring is the participant's job
    pub fn new(
        guid: Guid,
        qos: &QosProfile,
        config: ProtocolConfig,
        publish_mode: PublishMode,
        separate_sending: bool,
        allocation: ReaderAllocation,
        resources: Arc<SenderResourceCache>,
        async_sender: Arc<AsyncSender>,
        participant_controllers: SharedControllers,
        security: Option<Arc<dyn SecurityPlugin>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            guid,
            config,
            publish_mode,
            separate_sending,
            resources,
            async_sender,
            participant_controllers,
            listener: ArcSwapOption::empty(),
            liveliness: ArcSwapOption::empty(),
            security,
            metrics: Arc::new(DeliveryMetrics::new()),
            inner: Mutex::new(StatelessInner {
                history: WriterHistoryCache::new(guid, HistoryAttributes::from(qos)),
                registry: MatchedReaderRegistry::new(allocation),
                unsent: VecDeque::new(),
                flow_controllers: Vec::new(),
                inline_qos_expected: false,
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
    pub fn add_flow_controller(&self, controller: Box<dyn FlowController>) {
        self.inner.lock().flow_controllers.push(controller);
    }

    /// Submit a change: store in history, then dispatch per publish mode.
    pub fn write(&self, input: ChangeInput) -> Result<SequenceNumber> {
        let mut inner = self.inner.lock();
        let sn = inner.history.add_change(input)?;

        if !inner.registry.has_destinations() {
            drop(inner);
            log::debug!("[StatelessWriter] No reader to add change, acknowledging {}", sn);
            self.notify_received_by_all(&[sn]);
            return Ok(sn);
        }

        match self.publish_mode {
            PublishMode::Synchronous => {
                self.send_change_synchronously(&mut inner, sn)?;
                drop(inner);
                self.assert_liveliness();
                self.notify_received_by_all(&[sn]);
                Ok(sn)
            }
            PublishMode::Asynchronous => {
                let pending_fragments = inner
                    .history
                    .get(sn)
                    .map(|c| (1..=c.total_fragments()).collect())
                    .unwrap_or_default();
                inner.unsent.push_back(UnsentChange {
                    sn,
                    pending_fragments,
                });
                drop(inner);
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
        let mut inner = self.inner.lock();
        let result = inner.registry.add(data, &self.resources);
        if result == MatchResult::Rejected {
            return result;
        }

        let inline_qos_expected = inner.registry.iter().any(RemoteReader::expects_inline_qos);
        inner.inline_qos_expected = inline_qos_expected;

        // Late joiner wanting history: replay the whole cache.
        if result == MatchResult::Added && data.durability >= Durability::TransientLocal {
            let replay: Vec<UnsentChange> = inner
                .history
                .iter()
                .map(|c| UnsentChange {
                    sn: c.sequence_number,
                    pending_fragments: (1..=c.total_fragments()).collect(),
                })
                .collect();
            if !replay.is_empty() {
                inner.unsent.extend(replay);
                drop(inner);
                self.async_sender.wake_up(self.guid, None);
            }
        }
        result
    }

    pub fn matched_reader_remove(&self, guid: Guid) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.registry.remove(guid).is_some();
        if removed {
            let inline_qos_expected = inner.registry.iter().any(RemoteReader::expects_inline_qos);
            inner.inline_qos_expected = inline_qos_expected;
        }
        removed
    }

    #[must_use]
    pub fn matched_reader_is_matched(&self, guid: Guid) -> bool {
        self.inner.lock().registry.contains(guid)
    }

    /// Add non-discovered destinations included in every send.
    pub fn set_fixed_locators(&self, locators: Vec<Locator>) {
        self.inner
            .lock()
            .registry
            .set_fixed_locators(locators, &self.resources);
    }

    /// Re-queue the entire history as unsent (transport re-binding).
    pub fn unsent_changes_reset(&self) {
        let mut inner = self.inner.lock();
        inner.unsent.clear();
        let replay: Vec<UnsentChange> = inner
            .history
            .iter()
            .map(|c| UnsentChange {
                sn: c.sequence_number,
                pending_fragments: (1..=c.total_fragments()).collect(),
            })
            .collect();
        inner.unsent.extend(replay);
        drop(inner);
        self.async_sender.wake_up(self.guid, None);
    }

    /// A best-effort change counts as acknowledged once dispatched.
    #[must_use]
    pub fn is_acked_by_all(&self, sn: SequenceNumber) -> bool {
        match self.publish_mode {
            PublishMode::Synchronous => true,
            PublishMode::Asynchronous => {
                !self.inner.lock().unsent.iter().any(|u| u.sn == sn)
            }
        }
    }

    #[must_use]
    pub fn unsent_len(&self) -> usize {
        self.inner.lock().unsent.len()
    }

    fn send_change_synchronously(&self, inner: &mut StatelessInner, sn: SequenceNumber) -> Result<()> {
        let deadline = Instant::now() + self.config.max_blocking_time;
        let transport = Arc::clone(self.resources.transport());
        let security = self.security.as_deref();

        let change = inner
            .history
            .get(sn)
            .ok_or_else(|| Error::InvalidState(format!("change {} missing from history", sn)))?;

        if self.separate_sending {
            // One group per reader so each gets its own inline-QoS choice.
            for reader in inner.registry.iter() {
                let mut destinations = reader.unicast_locators().to_vec();
                destinations.extend_from_slice(reader.multicast_locators());
                let mut group =
                    MessageGroup::new(transport.as_ref(), &self.guid.prefix, destinations, deadline)
                        .with_security(security);
                Self::add_change_to_group(&mut group, change, reader.expects_inline_qos())?;
                group.flush().map_err(|e| self.note_send_error(e))?;
                self.record_dispatch(change);
            }
            // Fixed locators get the combined form.
            if !inner.registry.fixed_locators().is_empty() {
                let mut group = MessageGroup::new(
                    transport.as_ref(),
                    &self.guid.prefix,
                    inner.registry.fixed_locators().to_vec(),
                    deadline,
                )
                .with_security(security);
                Self::add_change_to_group(&mut group, change, false)?;
                group.flush()?;
                self.record_dispatch(change);
            }
        } else {
            let mut group = MessageGroup::new(
                transport.as_ref(),
                &self.guid.prefix,
                inner.registry.send_locators(),
                deadline,
            )
            .with_security(security);
            Self::add_change_to_group(&mut group, change, inner.inline_qos_expected)?;
            group.flush().map_err(|e| self.note_send_error(e))?;
            self.record_dispatch(change);
        }
        Ok(())
    }

    fn add_change_to_group(
        group: &mut MessageGroup<'_>,
        change: &crate::history::CacheChange,
        inline_qos: bool,
    ) -> Result<()> {
        if change.is_fragmented() {
            for fragment in 1..=change.total_fragments() {
                group.add_data_frag(change, fragment, ENTITYID_UNKNOWN, inline_qos)?;
            }
        } else {
            group.add_data(change, ENTITYID_UNKNOWN, inline_qos)?;
        }
        Ok(())
    }

    fn note_send_error(&self, e: Error) -> Error {
        if matches!(e, Error::WriteTimeout) {
            log::debug!("[StatelessWriter] Max blocking time reached");
            self.metrics.record_send_timeout();
        } else {
            log::error!("[StatelessWriter] Send failed: {}", e);
        }
        e
    }

    fn record_dispatch(&self, change: &crate::history::CacheChange) {
        if change.is_fragmented() {
            self.metrics
                .record_data_frag_sent(u64::from(change.total_fragments()));
        } else {
            self.metrics.record_data_sent(1);
        }
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

    /// One bounded pass over the unsent queue (async sender callback).
    fn run_send_pass(&self) -> SendOutcome {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.unsent.is_empty() {
            return SendOutcome::idle();
        }
        if !inner.registry.has_destinations() {
            // Destinations vanished; everything pending counts as delivered.
            let orphaned: Vec<SequenceNumber> = inner.unsent.drain(..).map(|u| u.sn).collect();
            drop(guard);
            self.notify_received_by_all(&orphaned);
            return SendOutcome::idle();
        }

        let mut collector = Collector::new();
        for unsent in &inner.unsent {
            match inner.history.get(unsent.sn) {
                Some(change) if change.is_fragmented() => {
                    for &fragment in &unsent.pending_fragments {
                        collector.add_fragment(
                            unsent.sn,
                            fragment,
                            None,
                            usize::from(change.fragment_size()),
                        );
                    }
                }
                Some(change) => {
                    collector.add_change(unsent.sn, None, change.payload().len());
                }
                None => {} // evicted; dropped from unsent below
            }
        }
        inner
            .unsent
            .retain(|u| inner_history_contains(&inner.history, u.sn));

        let mut release = run_controllers(&mut inner.flow_controllers, &mut collector);
        {
            let mut participant = self.participant_controllers.lock();
            let participant_release = run_controllers(&mut participant, &mut collector);
            release = earliest(release, participant_release);
        }

        let deadline = Instant::now() + self.config.max_blocking_time;
        let transport = Arc::clone(self.resources.transport());
        let mut group = MessageGroup::new(
            transport.as_ref(),
            &self.guid.prefix,
            inner.registry.send_locators(),
            deadline,
        )
        .with_security(self.security.as_deref());

        let mut dispatched: Vec<(SequenceNumber, FragmentNumber, usize)> = Vec::new();
        let mut timed_out = false;

        while let Some(item) = collector.pop() {
            let Some(change) = inner.history.get(item.sequence_number) else {
                continue;
            };
            let result = if item.fragment_number == 0 {
                group.add_data(change, ENTITYID_UNKNOWN, inner.inline_qos_expected)
            } else {
                group.add_data_frag(
                    change,
                    item.fragment_number,
                    ENTITYID_UNKNOWN,
                    inner.inline_qos_expected,
                )
            };
            match result {
                Ok(()) => {
                    dispatched.push((item.sequence_number, item.fragment_number, item.size_bytes));
                }
                Err(Error::WriteTimeout) => {
                    log::debug!("[StatelessWriter] Max blocking time reached");
                    self.metrics.record_send_timeout();
                    timed_out = true;
                    break;
                }
                Err(e) => {
                    log::error!(
                        "[StatelessWriter] Error sending change {}: {}",
                        item.sequence_number,
                        e
                    );
                }
            }
        }

        let flushed = match group.flush() {
            Ok(()) => true,
            Err(Error::WriteTimeout) => {
                self.metrics.record_send_timeout();
                timed_out = true;
                false
            }
            Err(e) => {
                log::error!("[StatelessWriter] Flush failed: {}", e);
                false
            }
        };

        let mut completed: Vec<SequenceNumber> = Vec::new();
        if flushed {
            for (sn, fragment, bytes) in &dispatched {
                notify_controllers_sent(&mut inner.flow_controllers, *bytes);
                notify_controllers_sent(&mut self.participant_controllers.lock(), *bytes);
                if *fragment == 0 {
                    self.metrics.record_data_sent(1);
                } else {
                    self.metrics.record_data_frag_sent(1);
                }
                if mark_sent(&mut inner.unsent, *sn, *fragment) {
                    completed.push(*sn);
                }
            }
        }

        let remaining = !inner.unsent.is_empty();
        drop(guard);

        if !completed.is_empty() {
            self.assert_liveliness();
            self.notify_received_by_all(&completed);
        }

        if remaining {
            let retry = if timed_out {
                Some(Instant::now() + self.config.max_blocking_time)
            } else {
                release
            };
            SendOutcome::backlog(retry)
        } else {
            SendOutcome::idle()
        }
    }
}

impl AsyncWriter for StatelessWriter {
    fn guid(&self) -> Guid {
        self.guid
    }

    fn send_any_unsent_changes(&self) -> SendOutcome {
        self.run_send_pass()
    }
}

fn inner_history_contains(history: &WriterHistoryCache, sn: SequenceNumber) -> bool {
    history.get(sn).is_some()
}

/// Mark one dispatched item in the unsent queue. Returns `true` when the
/// change is now fully sent (and was removed).
fn mark_sent(
    unsent: &mut VecDeque<UnsentChange>,
    sn: SequenceNumber,
    fragment: FragmentNumber,
) -> bool {
    let Some(pos) = unsent.iter().position(|u| u.sn == sn) else {
        return false;
    };
    if fragment == 0 {
        unsent.remove(pos);
        return true;
    }
    let entry = &mut unsent[pos];
    entry.pending_fragments.retain(|f| *f != fragment);
    if entry.pending_fragments.is_empty() {
        unsent.remove(pos);
        return true;
    }
    false
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, y) => x.or(y),
    }
}
