//! Per-vehicle latest-value cache of decoded messages.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::protocol::{GlobalPositionInt, Heartbeat, Message, MessagePayload, SysStatus};
use crate::types::MessageId;

/// Mapping from message type id to the single most-recent message of that
/// type. Latest-wins per key; no history is retained.
///
/// Readers run concurrently with the owning session's receive loop and
/// always observe either the old or the new `Arc`, never a torn value.
#[derive(Debug, Default)]
pub struct VehicleStateCache {
    entries: RwLock<HashMap<MessageId, Arc<Message>>>,
}

impl VehicleStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached entry for this message's type unconditionally.
    pub fn update(&self, message: Arc<Message>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(message.id, message);
    }

    /// The most recent message of the given type, if any has been received.
    pub fn get(&self, id: MessageId) -> Option<Arc<Message>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&id).cloned()
    }

    /// Message type ids currently held, in no particular order.
    pub fn message_ids(&self) -> Vec<MessageId> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.keys().copied().collect()
    }

    /// The most recent heartbeat, if any.
    pub fn heartbeat(&self) -> Option<Heartbeat> {
        match self.get(MessageId::HEARTBEAT)?.payload {
            MessagePayload::Heartbeat(ref hb) => Some(hb.clone()),
            _ => None,
        }
    }

    /// The most recent system status, if any.
    pub fn sys_status(&self) -> Option<SysStatus> {
        match self.get(MessageId::SYS_STATUS)?.payload {
            MessagePayload::SysStatus(ref status) => Some(status.clone()),
            _ => None,
        }
    }

    /// The most recent global position, if any.
    pub fn global_position(&self) -> Option<GlobalPositionInt> {
        match self.get(MessageId::GLOBAL_POSITION_INT)?.payload {
            MessagePayload::GlobalPositionInt(ref pos) => Some(pos.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AutopilotType, ModeFlags, SystemStatus, VehicleType};

    fn heartbeat_message(sequence: u8, custom_mode: u32) -> Arc<Message> {
        Arc::new(Message {
            id: MessageId::HEARTBEAT,
            sequence,
            system_id: 1,
            component_id: 1,
            payload: MessagePayload::Heartbeat(Heartbeat {
                custom_mode,
                vehicle_type: VehicleType::Quadrotor,
                autopilot: AutopilotType::ArduPilot,
                base_mode: ModeFlags::new(0),
                system_status: SystemStatus::Active,
                protocol_version: 3,
            }),
        })
    }

    #[test]
    fn empty_cache_returns_absent() {
        let cache = VehicleStateCache::new();
        assert!(cache.get(MessageId::HEARTBEAT).is_none());
        assert!(cache.heartbeat().is_none());
    }

    #[test]
    fn latest_wins_per_key() {
        let cache = VehicleStateCache::new();
        cache.update(heartbeat_message(0, 100));
        cache.update(heartbeat_message(1, 200));

        let hb = cache.heartbeat().unwrap();
        assert_eq!(hb.custom_mode, 200);
        assert_eq!(cache.message_ids(), vec![MessageId::HEARTBEAT]);
    }

    #[test]
    fn concurrent_readers_observe_old_or_new() {
        let cache = Arc::new(VehicleStateCache::new());
        cache.update(heartbeat_message(0, 1));

        let writer = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..1000u32 {
                    cache.update(heartbeat_message(0, i));
                }
            })
        };

        for _ in 0..1000 {
            let hb = cache.heartbeat().unwrap();
            assert!(hb.custom_mode < 1000);
        }
        writer.join().unwrap();
    }
}
