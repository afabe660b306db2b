// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Publication participant: wiring and inbound demultiplexing.
//!
//! Owns the shared infrastructure every writer uses — the transport's
//! sender-resource cache, the async sender pool, the participant-level flow
//! controllers and the WLP — and routes inbound submessages to the right
//! engine by writer entity id.
//!
//! Shutdown order matters: protocol timers first, then the async sender
//! (joining its workers), then the writers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::ProtocolConfig;
use crate::core::types::{
    EntityId, Guid, GuidPrefix, ENTITYID_PARTICIPANT_MESSAGE_WRITER,
};
use crate::flow::FlowController;
use crate::liveliness::{
    LivelinessEvent, ParticipantMessageData, Wlp, WlpAssertionHook,
};
use crate::protocol::rtps::{parse_message, Submessage};
use crate::qos::{LivelinessKind, QosProfile, Reliability};
use crate::security::SecurityPlugin;
use crate::sender::AsyncSender;
use crate::transport::{SenderResourceCache, Transport};
use crate::writer::{
    PublishMode, ReaderAllocation, SharedControllers, StatefulWriter, StatelessWriter,
};
use crate::{Error, Result};

/// Per-writer creation knobs beyond the QoS profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriterOptions {
    pub publish_mode: PublishMode,
    /// Stateless engine only: one message group per reader instead of a
    /// combined fan-out.
    pub separate_sending: bool,
    pub allocation: ReaderAllocation,
}

#[derive(Clone)]
enum PublicationEndpoint {
    Stateless(Arc<StatelessWriter>),
    Stateful(Arc<StatefulWriter>),
}

/// Handler invoked when a matched remote writer changes liveliness.
pub type RemoteLivelinessHandler = Box<dyn Fn(Guid, bool) + Send + Sync>;

/// The publication side of an RTPS participant.
pub struct Participant {
    guid_prefix: GuidPrefix,
    config: ProtocolConfig,
    resources: Arc<SenderResourceCache>,
    async_sender: Arc<AsyncSender>,
    wlp: Arc<Wlp>,
    controllers: SharedControllers,
    writers: Arc<DashMap<EntityId, PublicationEndpoint>>,
    security: Option<Arc<dyn SecurityPlugin>>,
    remote_liveliness: Arc<ArcSwapOption<RemoteLivelinessHandler>>,
    entity_counter: AtomicU32,
}

impl Participant {
    /// Assemble a participant over the given transport.
    pub fn new(
        guid_prefix: GuidPrefix,
        transport: Arc<dyn Transport>,
        config: ProtocolConfig,
    ) -> Arc<Self> {
        Self::with_security(guid_prefix, transport, config, None)
    }

    pub fn with_security(
        guid_prefix: GuidPrefix,
        transport: Arc<dyn Transport>,
        config: ProtocolConfig,
        security: Option<Arc<dyn SecurityPlugin>>,
    ) -> Arc<Self> {
        let resources = Arc::new(SenderResourceCache::new(transport));
        let async_sender = AsyncSender::new(config.send_workers);
        let controllers: SharedControllers = Arc::new(Mutex::new(Vec::new()));
        let writers: Arc<DashMap<EntityId, PublicationEndpoint>> = Arc::new(DashMap::new());

        let builtin_writer = StatefulWriter::new(
            Guid::new(guid_prefix, ENTITYID_PARTICIPANT_MESSAGE_WRITER),
            &QosProfile::transient_local(),
            config.clone(),
            PublishMode::Asynchronous,
            ReaderAllocation::default(),
            Arc::clone(&resources),
            Arc::clone(&async_sender),
            Arc::clone(&controllers),
            security.clone(),
        );
        async_sender.register_writer(builtin_writer.clone());
        writers.insert(
            ENTITYID_PARTICIPANT_MESSAGE_WRITER,
            PublicationEndpoint::Stateful(builtin_writer.clone()),
        );

        // Owned-writer transitions fan out to that writer's listener.
        let pub_writers = Arc::clone(&writers);
        let pub_events = Box::new(move |event: &LivelinessEvent| {
            let (writer, alive) = match *event {
                LivelinessEvent::Lost { writer, .. } => (writer, false),
                LivelinessEvent::Recovered { writer, .. } => (writer, true),
            };
            if let Some(endpoint) = pub_writers.get(&writer.entity_id) {
                match endpoint.value() {
                    PublicationEndpoint::Stateless(w) => w.notify_liveliness(alive),
                    PublicationEndpoint::Stateful(w) => w.notify_liveliness(alive),
                }
            }
        });

        // Remote-writer transitions go to a swappable participant handler.
        let remote_handler: Arc<ArcSwapOption<RemoteLivelinessHandler>> =
            Arc::new(ArcSwapOption::empty());
        let sub_handler = Arc::clone(&remote_handler);
        let sub_events = Box::new(move |event: &LivelinessEvent| {
            let (writer, alive) = match *event {
                LivelinessEvent::Lost { writer, .. } => (writer, false),
                LivelinessEvent::Recovered { writer, .. } => (writer, true),
            };
            if let Some(handler) = sub_handler.load_full() {
                (**handler)(writer, alive);
            }
        });

        let wlp = Wlp::new(guid_prefix, builtin_writer, pub_events, sub_events);

        Arc::new(Self {
            guid_prefix,
            config,
            resources,
            async_sender,
            wlp,
            controllers,
            writers,
            security,
            remote_liveliness: remote_handler,
            entity_counter: AtomicU32::new(1),
        })
    }

    #[must_use]
    pub fn guid_prefix(&self) -> GuidPrefix {
        self.guid_prefix
    }

    #[must_use]
    pub fn wlp(&self) -> &Arc<Wlp> {
        &self.wlp
    }

    #[must_use]
    pub fn async_sender(&self) -> &Arc<AsyncSender> {
        &self.async_sender
    }

    /// Append a participant-level flow controller (runs after writer-local
    /// ones for every writer).
    pub fn add_flow_controller(&self, controller: Box<dyn FlowController>) {
        self.controllers.lock().push(controller);
    }

    /// Create a best-effort writer.
    pub fn create_stateless_writer(
        &self,
        qos: &QosProfile,
        options: WriterOptions,
    ) -> Result<Arc<StatelessWriter>> {
        qos.validate().map_err(Error::InvalidQos)?;
        if qos.reliability == Reliability::Reliable {
            return Err(Error::InvalidQos(
                "reliable QoS requires a stateful writer".to_string(),
            ));
        }

        let guid = Guid::new(self.guid_prefix, self.next_entity_id());
        let writer = StatelessWriter::new(
            guid,
            qos,
            self.config.clone(),
            options.publish_mode,
            options.separate_sending,
            options.allocation,
            Arc::clone(&self.resources),
            Arc::clone(&self.async_sender),
            Arc::clone(&self.controllers),
            self.security.clone(),
        );

        writer.set_liveliness_hook(Box::new(WlpAssertionHook::new(&self.wlp)));
        self.wlp.add_local_writer(guid, &qos.liveliness);
        self.async_sender.register_writer(writer.clone());
        self.writers
            .insert(guid.entity_id, PublicationEndpoint::Stateless(writer.clone()));
        Ok(writer)
    }

    /// Create a reliable writer.
    pub fn create_stateful_writer(
        &self,
        qos: &QosProfile,
        options: WriterOptions,
    ) -> Result<Arc<StatefulWriter>> {
        qos.validate().map_err(Error::InvalidQos)?;
        if qos.reliability == Reliability::BestEffort {
            return Err(Error::InvalidQos(
                "best-effort QoS requires a stateless writer".to_string(),
            ));
        }

        let guid = Guid::new(self.guid_prefix, self.next_entity_id());
        let writer = StatefulWriter::new(
            guid,
            qos,
            self.config.clone(),
            options.publish_mode,
            options.allocation,
            Arc::clone(&self.resources),
            Arc::clone(&self.async_sender),
            Arc::clone(&self.controllers),
            self.security.clone(),
        );

        writer.set_liveliness_hook(Box::new(WlpAssertionHook::new(&self.wlp)));
        self.wlp.add_local_writer(guid, &qos.liveliness);
        self.async_sender.register_writer(writer.clone());
        self.writers
            .insert(guid.entity_id, PublicationEndpoint::Stateful(writer.clone()));
        Ok(writer)
    }

    /// Tear down one writer: async sender first, then WLP, then the map.
    pub fn delete_writer(&self, guid: Guid) -> bool {
        let Some((_, _endpoint)) = self.writers.remove(&guid.entity_id) else {
            log::debug!("[Participant] delete_writer: {} not found", guid);
            return false;
        };
        self.async_sender.unregister_writer(guid);
        self.wlp.remove_local_writer(guid);
        true
    }

    /// Assert liveliness of every owned writer of `kind`.
    pub fn assert_liveliness(&self, kind: LivelinessKind) -> bool {
        self.wlp.assert_liveliness(kind)
    }

    /// Install the handler for matched-remote-writer liveliness changes.
    pub fn set_remote_liveliness_handler(&self, handler: RemoteLivelinessHandler) {
        self.remote_liveliness.store(Some(Arc::new(handler)));
    }

    /// Demultiplex one inbound RTPS message to the owning engines.
    ///
    /// ACKNACK/NACKFRAG go to the stateful writer named by their writer
    /// entity id; participant-message DATA feeds the WLP. INFO_DST scopes
    /// the following submessages to a destination participant.
    pub fn handle_message(&self, bytes: &[u8]) -> Result<()> {
        let (src_prefix, submessages) = parse_message(bytes)
            .map_err(|e| Error::InvalidState(format!("undecodable RTPS message: {e}")))?;

        let mut dest_scope: Option<GuidPrefix> = None;
        for submessage in submessages {
            if let Submessage::InfoDestination(info) = &submessage {
                dest_scope = Some(info.guid_prefix);
                continue;
            }
            if let Some(dest) = dest_scope {
                if dest != [0; 12] && dest != self.guid_prefix {
                    continue;
                }
            }

            match submessage {
                Submessage::AckNack(msg) => {
                    match self.stateful_by_entity(msg.writer_id) {
                        Some(writer) => {
                            writer.on_acknack(src_prefix, &msg);
                        }
                        None => log::debug!(
                            "[Participant] ACKNACK for unknown writer {:02X?}",
                            msg.writer_id
                        ),
                    }
                }
                Submessage::NackFrag(msg) => {
                    match self.stateful_by_entity(msg.writer_id) {
                        Some(writer) => {
                            writer.on_nackfrag(src_prefix, &msg);
                        }
                        None => log::debug!(
                            "[Participant] NACKFRAG for unknown writer {:02X?}",
                            msg.writer_id
                        ),
                    }
                }
                Submessage::Data(data)
                    if data.writer_id == ENTITYID_PARTICIPANT_MESSAGE_WRITER =>
                {
                    match ParticipantMessageData::decode(&data.payload) {
                        Some(sample) => self.wlp.on_participant_message(&sample),
                        None => log::debug!(
                            "[Participant] Undecodable participant message from {:02X?}",
                            &src_prefix[..4]
                        ),
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Stop timers, join the sender workers, release the writers.
    pub fn shutdown(&self) {
        self.wlp.shutdown();
        let guids: Vec<Guid> = self
            .writers
            .iter()
            .map(|entry| match entry.value() {
                PublicationEndpoint::Stateless(w) => w.guid(),
                PublicationEndpoint::Stateful(w) => w.guid(),
            })
            .collect();
        for guid in guids {
            self.async_sender.unregister_writer(guid);
        }
        self.async_sender.shutdown();
        self.writers.clear();
    }

    fn stateful_by_entity(&self, entity_id: EntityId) -> Option<Arc<StatefulWriter>> {
        match self.writers.get(&entity_id)?.value() {
            PublicationEndpoint::Stateful(w) => Some(Arc::clone(w)),
            PublicationEndpoint::Stateless(_) => None,
        }
    }

    /// User-defined writer entity ids: 3-byte counter + writer kind octet.
    fn next_entity_id(&self) -> EntityId {
        let count = self.entity_counter.fetch_add(1, Ordering::Relaxed);
        let [_, b0, b1, b2] = count.to_be_bytes();
        [b0, b1, b2, 0x02]
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        self.shutdown();
    }
}
