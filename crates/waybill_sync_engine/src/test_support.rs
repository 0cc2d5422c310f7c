//! Shared fixtures for unit tests.

use crate::outbox::Outbox;
use crate::records;
use serde_json::Value;
use waybill_core::LocalStore;
use waybill_sync_protocol::mapper::{EntityMapper, ItemMapper, ItemWire};
use waybill_sync_protocol::{EntityType, Operation, Priority, WirePayload};

pub(crate) fn item_wire(id: &str, grams: u64) -> ItemWire {
    ItemWire {
        id: id.to_string(),
        pickup_request_id: "pr-1".to_string(),
        description: "parcel".to_string(),
        quantity: Some(1),
        weight_grams: grams,
        dimensions: None,
        barcode: None,
    }
}

pub(crate) fn item_json(id: &str, grams: u64) -> Value {
    serde_json::to_value(item_wire(id, grams)).unwrap()
}

pub(crate) fn item_payload(id: &str, grams: u64) -> WirePayload {
    ItemMapper::into_payload(item_wire(id, grams))
}

/// Saves an item locally and queues it, the way a form submit would.
pub(crate) fn seed_item(store: &LocalStore, id: &str, grams: u64, priority: Priority) {
    let local = ItemMapper::to_local(item_wire(id, grams)).unwrap();
    let payload = ItemMapper::into_payload(ItemMapper::to_wire(&local));
    store
        .transaction(|txn| {
            let body = serde_json::to_value(&local)?;
            let existed = records::write_local_in(txn, EntityType::Item, id, body)?;
            let operation = if existed {
                Operation::Update
            } else {
                Operation::Create
            };
            Outbox::enqueue_in(txn, id, EntityType::Item, operation, Some(payload), priority)
        })
        .unwrap();
}
