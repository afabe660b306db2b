// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Outbound RTPS message assembly.
//!
//! A message group accumulates submessages behind one RTPS header and
//! flushes the whole message to every destination locator. Flushes happen
//! when the group is told to, or early when the next submessage would
//! overflow [`MAX_MESSAGE_SIZE`](crate::config::MAX_MESSAGE_SIZE). Every
//! send is bounded by the group's deadline.

use std::time::Instant;

use crate::config::MAX_MESSAGE_SIZE;
use crate::core::types::{EntityId, FragmentNumber, GuidPrefix, Locator};
use crate::history::CacheChange;
use crate::protocol::rtps::{
    put_message_header, DataFragSubmessage, DataSubmessage, GapSubmessage, HeartbeatSubmessage,
    InfoDestinationSubmessage, InfoTimestampSubmessage, EMPTY_INLINE_QOS, RTPS_HEADER_LEN,
};
use crate::security::SecurityPlugin;
use crate::transport::Transport;
use crate::{Error, Result};

/// Accumulates submessages for one burst of destinations.
pub struct MessageGroup<'a> {
    transport: &'a dyn Transport,
    security: Option<&'a dyn SecurityPlugin>,
    sender_prefix: GuidPrefix,
    destinations: Vec<Locator>,
    deadline: Instant,
    buffer: Vec<u8>,
}

impl<'a> MessageGroup<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        sender_prefix: &GuidPrefix,
        destinations: Vec<Locator>,
        deadline: Instant,
    ) -> Self {
        let mut buffer = Vec::with_capacity(1024);
        put_message_header(&mut buffer, sender_prefix);
        Self {
            transport,
            security: None,
            sender_prefix: *sender_prefix,
            destinations,
            deadline,
            buffer,
        }
    }

    #[must_use]
    pub fn with_security(mut self, security: Option<&'a dyn SecurityPlugin>) -> Self {
        self.security = security;
        self
    }

    /// Queue a DATA submessage for `change`, prefixed with its source
    /// timestamp.
    pub fn add_data(
        &mut self,
        change: &CacheChange,
        reader_id: EntityId,
        inline_qos_expected: bool,
    ) -> Result<()> {
        let payload = self.protected_payload(change.payload())?;
        let data = DataSubmessage {
            reader_id,
            writer_id: change.writer_guid.entity_id,
            writer_sn: change.sequence_number,
            inline_qos: inline_qos_blob(change, inline_qos_expected),
            payload,
        };

        let ts = InfoTimestampSubmessage::from_nanos(change.source_timestamp_ns).encode();
        let body = data.encode();
        self.append(&[&ts, &body])
    }

    /// Queue a DATA_FRAG submessage carrying one fragment of `change`.
    pub fn add_data_frag(
        &mut self,
        change: &CacheChange,
        fragment: FragmentNumber,
        reader_id: EntityId,
        inline_qos_expected: bool,
    ) -> Result<()> {
        let Some(slice) = change.fragment(fragment) else {
            return Err(Error::InvalidState(format!(
                "change {} has no fragment {}",
                change.sequence_number, fragment
            )));
        };
        let payload = self.protected_payload(slice)?;

        let frag = DataFragSubmessage {
            reader_id,
            writer_id: change.writer_guid.entity_id,
            writer_sn: change.sequence_number,
            fragment_starting_num: fragment,
            fragments_in_submessage: 1,
            fragment_size: change.fragment_size(),
            sample_size: change.payload().len() as u32,
            inline_qos: inline_qos_blob(change, inline_qos_expected),
            payload,
        };

        let ts = InfoTimestampSubmessage::from_nanos(change.source_timestamp_ns).encode();
        let body = frag.encode();
        self.append(&[&ts, &body])
    }

    pub fn add_heartbeat(&mut self, heartbeat: &HeartbeatSubmessage) -> Result<()> {
        self.append(&[&heartbeat.encode()])
    }

    pub fn add_gap(&mut self, gap: &GapSubmessage) -> Result<()> {
        self.append(&[&gap.encode()])
    }

    /// Scope the following submessages to one destination participant.
    pub fn add_info_destination(&mut self, prefix: GuidPrefix) -> Result<()> {
        self.append(&[&InfoDestinationSubmessage::new(prefix).encode()])
    }

    /// Send the accumulated message to every destination and reset.
    ///
    /// A deadline overrun surfaces as `Error::WriteTimeout`; per-locator
    /// transport failures are logged and the first one is returned after the
    /// remaining destinations were attempted.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.len() == RTPS_HEADER_LEN {
            return Ok(());
        }

        let message: Vec<u8> = match self.security {
            Some(plugin) => {
                // A failed protection drops the whole batch; the engines keep
                // the affected changes unacknowledged.
                let protected = plugin.protect_message(&self.buffer);
                self.reset();
                protected?
            }
            None => {
                let message = std::mem::take(&mut self.buffer);
                self.reset();
                message
            }
        };

        let mut first_error = None;
        for locator in &self.destinations {
            match self.transport.send(&message, locator, self.deadline) {
                Ok(()) => {}
                Err(Error::WriteTimeout) => {
                    log::debug!("[MessageGroup] Deadline reached sending to {}", locator);
                    first_error.get_or_insert(Error::WriteTimeout);
                }
                Err(e) => {
                    log::error!("[MessageGroup] Send to {} failed: {}", locator, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.len() == RTPS_HEADER_LEN
    }

    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    fn append(&mut self, parts: &[&[u8]]) -> Result<()> {
        let added: usize = parts.iter().map(|p| p.len()).sum();
        if self.buffer.len() + added > MAX_MESSAGE_SIZE && !self.is_empty() {
            self.flush()?;
        }
        for part in parts {
            self.buffer.extend_from_slice(part);
        }
        Ok(())
    }

    fn protected_payload(&self, payload: &[u8]) -> Result<Vec<u8>> {
        match self.security {
            Some(plugin) => plugin.encrypt_payload(payload),
            None => Ok(payload.to_vec()),
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        put_message_header(&mut self.buffer, &self.sender_prefix);
    }
}

impl Drop for MessageGroup<'_> {
    fn drop(&mut self) {
        if !self.is_empty() {
            if let Err(e) = self.flush() {
                log::debug!("[MessageGroup] Flush on drop failed: {}", e);
            }
        }
    }
}

fn inline_qos_blob(change: &CacheChange, expected: bool) -> Option<Vec<u8>> {
    if !expected {
        return None;
    }
    Some(
        change
            .inline_qos
            .clone()
            .unwrap_or_else(|| EMPTY_INLINE_QOS.to_vec()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Guid, ENTITYID_UNKNOWN};
    use crate::history::{ChangeInput, HistoryAttributes, WriterHistoryCache};
    use crate::protocol::rtps::{parse_message, Submessage};
    use crate::qos::QosProfile;
    use crate::security::testing::XorPlugin;
    use crate::transport::mem::MemTransport;
    use std::time::Duration;

    fn writer_guid() -> Guid {
        Guid::new([9; 12], [0, 0, 1, 0x02])
    }

    fn cache_with_one_change(payload: Vec<u8>) -> WriterHistoryCache {
        let qos = QosProfile::default();
        let mut cache = WriterHistoryCache::new(writer_guid(), HistoryAttributes::from(&qos));
        cache
            .add_change(ChangeInput::data(payload))
            .expect("insert should succeed");
        cache
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(1)
    }

    #[test]
    fn test_data_sent_once_per_destination() {
        let transport = MemTransport::new();
        let cache = cache_with_one_change(vec![0xAB; 100]);
        let change = cache.get(1).expect("change present");

        let a = Locator::udpv4(10, 0, 0, 1, 7400);
        let b = Locator::udpv4(239, 255, 0, 1, 7401);
        let mut group = MessageGroup::new(&transport, &writer_guid().prefix, vec![a, b], deadline());
        group
            .add_data(change, ENTITYID_UNKNOWN, false)
            .expect("add_data should succeed");
        group.flush().expect("flush should succeed");

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1, sent[1].1);

        let (prefix, submessages) = parse_message(&sent[0].1).expect("well-formed message");
        assert_eq!(prefix, writer_guid().prefix);
        assert!(matches!(submessages[0], Submessage::InfoTimestamp(_)));
        match &submessages[1] {
            Submessage::Data(data) => {
                assert_eq!(data.writer_sn, 1);
                assert_eq!(data.payload.len(), 100);
                assert!(data.inline_qos.is_none());
            }
            other => panic!("expected DATA, got {:?}", other),
        }
    }

    #[test]
    fn test_inline_qos_fallback_blob() {
        let transport = MemTransport::new();
        let cache = cache_with_one_change(vec![1, 2, 3]);
        let change = cache.get(1).expect("change present");

        let dst = Locator::udpv4(10, 0, 0, 2, 7400);
        let mut group =
            MessageGroup::new(&transport, &writer_guid().prefix, vec![dst], deadline());
        group
            .add_data(change, ENTITYID_UNKNOWN, true)
            .expect("add_data should succeed");
        group.flush().expect("flush should succeed");

        let messages = transport.sent_to(&dst);
        let (_, submessages) = parse_message(&messages[0]).expect("well-formed message");
        match &submessages[1] {
            Submessage::Data(data) => {
                assert_eq!(data.inline_qos.as_deref(), Some(&EMPTY_INLINE_QOS[..]));
            }
            other => panic!("expected DATA, got {:?}", other),
        }
    }

    #[test]
    fn test_fragment_dispatch() {
        let qos = QosProfile::default();
        let mut cache = WriterHistoryCache::new(writer_guid(), HistoryAttributes::from(&qos));
        cache
            .add_change(ChangeInput::data(vec![0u8; 2048]).with_fragment_size(1024))
            .expect("insert should succeed");
        let change = cache.get(1).expect("change present");

        let transport = MemTransport::new();
        let dst = Locator::udpv4(10, 0, 0, 3, 7400);
        let mut group =
            MessageGroup::new(&transport, &writer_guid().prefix, vec![dst], deadline());
        group
            .add_data_frag(change, 2, ENTITYID_UNKNOWN, false)
            .expect("add_data_frag should succeed");
        group.flush().expect("flush should succeed");

        let (_, submessages) =
            parse_message(&transport.sent_to(&dst)[0]).expect("well-formed message");
        match &submessages[1] {
            Submessage::DataFrag(frag) => {
                assert_eq!(frag.fragment_starting_num, 2);
                assert_eq!(frag.fragments_in_submessage, 1);
                assert_eq!(frag.sample_size, 2048);
            }
            other => panic!("expected DATA_FRAG, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_fragment_is_invalid_state() {
        let transport = MemTransport::new();
        let cache = cache_with_one_change(vec![1, 2, 3]); // unfragmented
        let change = cache.get(1).expect("change present");

        let mut group = MessageGroup::new(
            &transport,
            &writer_guid().prefix,
            vec![Locator::udpv4(10, 0, 0, 1, 7400)],
            deadline(),
        );
        let err = group
            .add_data_frag(change, 1, ENTITYID_UNKNOWN, false)
            .expect_err("unfragmented change has no fragments");
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_empty_group_flush_is_noop() {
        let transport = MemTransport::new();
        let mut group = MessageGroup::new(
            &transport,
            &writer_guid().prefix,
            vec![Locator::udpv4(10, 0, 0, 1, 7400)],
            deadline(),
        );
        group.flush().expect("empty flush is a no-op");
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_security_failure_keeps_change_off_the_wire() {
        let transport = MemTransport::new();
        let cache = cache_with_one_change(vec![7; 16]);
        let change = cache.get(1).expect("change present");

        let plugin = XorPlugin { key: 0x55, fail: true };
        let mut group = MessageGroup::new(
            &transport,
            &writer_guid().prefix,
            vec![Locator::udpv4(10, 0, 0, 1, 7400)],
            deadline(),
        )
        .with_security(Some(&plugin));

        let err = group
            .add_data(change, ENTITYID_UNKNOWN, false)
            .expect_err("encryption refusal must fail the add");
        assert!(matches!(err, Error::SecurityFailure(_)));
        group.flush().expect("nothing queued, flush is a no-op");
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_security_payload_transform_applied() {
        let transport = MemTransport::new();
        let cache = cache_with_one_change(vec![0x0F; 8]);
        let change = cache.get(1).expect("change present");

        let plugin = XorPlugin { key: 0xF0, fail: false };
        let dst = Locator::udpv4(10, 0, 0, 1, 7400);
        let mut group =
            MessageGroup::new(&transport, &writer_guid().prefix, vec![dst], deadline())
                .with_security(Some(&plugin));
        group
            .add_data(change, ENTITYID_UNKNOWN, false)
            .expect("add_data should succeed");
        group.flush().expect("flush should succeed");

        let (_, submessages) =
            parse_message(&transport.sent_to(&dst)[0]).expect("well-formed message");
        match &submessages[1] {
            Submessage::Data(data) => assert_eq!(data.payload, vec![0xFF; 8]),
            other => panic!("expected DATA, got {:?}", other),
        }
    }

    #[test]
    fn test_stalled_transport_times_out() {
        let transport = MemTransport::new();
        transport.stall(Duration::from_secs(5));
        let cache = cache_with_one_change(vec![1]);
        let change = cache.get(1).expect("change present");

        let mut group = MessageGroup::new(
            &transport,
            &writer_guid().prefix,
            vec![Locator::udpv4(10, 0, 0, 1, 7400)],
            Instant::now() + Duration::from_millis(30),
        );
        group
            .add_data(change, ENTITYID_UNKNOWN, false)
            .expect("add_data should succeed");
        let err = group.flush().expect_err("stalled transport must time out");
        assert!(matches!(err, Error::WriteTimeout));
    }
}
