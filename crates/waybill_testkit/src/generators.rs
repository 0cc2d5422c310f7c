//! Property-based test generators using proptest.
//!
//! Generated entities survive a local → wire → local round trip unchanged:
//! weights are whole grams and timestamps whole milliseconds.

use proptest::prelude::*;
use waybill_sync_protocol::mapper::{Item, LocationPing, Signature};
use waybill_sync_protocol::{EntityType, Operation, Priority};

/// Strategy for entity ids drawn from a small pool, so sequences revisit ids.
pub fn entity_id_strategy(pool: usize) -> impl Strategy<Value = String> {
    (0..pool.max(1)).prop_map(|n| format!("e-{n}"))
}

/// Strategy for outbox priorities.
pub fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::HIGH),
        Just(Priority::MEDIUM),
        Just(Priority::LOW),
        (1u8..=10).prop_map(Priority),
    ]
}

/// Strategy for entity types.
pub fn entity_type_strategy() -> impl Strategy<Value = EntityType> {
    prop::sample::select(EntityType::ALL.to_vec())
}

/// Strategy for outbox operations.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::Create),
        Just(Operation::Update),
        Just(Operation::Delete),
    ]
}

/// Strategy for epoch-millisecond timestamps between 2001 and 2096.
pub fn timestamp_strategy() -> impl Strategy<Value = i64> {
    1_000_000_000_000i64..4_000_000_000_000
}

/// Strategy for items with the given id.
pub fn item_strategy(id: String) -> impl Strategy<Value = Item> {
    (
        1u32..50,
        0u64..100_000,
        prop::option::of((1u16..300, 1u16..300, 1u16..300)),
        prop::option::of("[0-9]{12}"),
    )
        .prop_map(move |(quantity, grams, dims, barcode)| Item {
            id: id.clone(),
            pickup_request_id: "pr-1".into(),
            description: "parcel".into(),
            quantity,
            weight_kg: grams as f64 / 1_000.0,
            length_cm: dims.map(|d| f64::from(d.0)),
            width_cm: dims.map(|d| f64::from(d.1)),
            height_cm: dims.map(|d| f64::from(d.2)),
            barcode,
        })
}

/// Strategy for signatures.
pub fn signature_strategy() -> impl Strategy<Value = Signature> {
    (
        "sg-[a-z0-9]{1,8}",
        "[A-Z][a-z]{1,10}",
        "[A-Za-z0-9+/]{4,40}",
        timestamp_strategy(),
    )
        .prop_map(|(id, signer_name, image_data, signed_at)| Signature {
            id,
            pickup_request_id: "pr-1".into(),
            signer_name,
            image_data,
            signed_at,
        })
}

/// Strategy for location pings.
pub fn location_ping_strategy() -> impl Strategy<Value = LocationPing> {
    (
        "lp-[a-z0-9]{1,8}",
        -90.0f64..=90.0,
        -180.0f64..=180.0,
        0.0f64..100.0,
        timestamp_strategy(),
        prop::option::of(0.0f64..130.0),
    )
        .prop_map(
            |(id, latitude, longitude, accuracy_m, recorded_at, speed_kmh)| LocationPing {
                id,
                driver_id: "drv-1".into(),
                latitude,
                longitude,
                accuracy_m,
                recorded_at,
                speed_kmh,
            },
        )
}

/// One local edit in a generated session.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEdit {
    /// Save (create or update) an item.
    Save(Item),
    /// Delete an item by id.
    Delete(String),
}

impl LocalEdit {
    /// The id the edit touches.
    pub fn id(&self) -> &str {
        match self {
            LocalEdit::Save(item) => &item.id,
            LocalEdit::Delete(id) => id,
        }
    }
}

/// Strategy for sequences of item edits over a pool of `ids` ids.
pub fn edit_sequence_strategy(ids: usize, max_len: usize) -> impl Strategy<Value = Vec<LocalEdit>> {
    let edit = prop_oneof![
        3 => entity_id_strategy(ids).prop_flat_map(item_strategy).prop_map(LocalEdit::Save),
        1 => entity_id_strategy(ids).prop_map(LocalEdit::Delete),
    ];
    prop::collection::vec(edit, 1..max_len.max(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use waybill_sync_protocol::mapper::{ItemMapper, LocationPingMapper, SignatureMapper};
    use waybill_sync_protocol::EntityMapper;

    proptest! {
        #[test]
        fn items_survive_the_wire(item in item_strategy("it-1".into())) {
            let back = ItemMapper::to_local(ItemMapper::to_wire(&item)).unwrap();
            prop_assert_eq!(back, item);
        }

        #[test]
        fn signatures_survive_the_wire(signature in signature_strategy()) {
            let back = SignatureMapper::to_local(SignatureMapper::to_wire(&signature)).unwrap();
            prop_assert_eq!(back, signature);
        }

        #[test]
        fn pings_survive_the_wire(ping in location_ping_strategy()) {
            let back = LocationPingMapper::to_local(LocationPingMapper::to_wire(&ping)).unwrap();
            prop_assert_eq!(back, ping);
        }

        #[test]
        fn edit_ids_come_from_the_pool(edits in edit_sequence_strategy(3, 10)) {
            for edit in &edits {
                prop_assert!(["e-0", "e-1", "e-2"].contains(&edit.id()));
            }
        }
    }
}
