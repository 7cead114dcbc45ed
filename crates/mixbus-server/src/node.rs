//! Node and stream identifier packing (`spec.md §6`).

/// `high 32 bits = device index, low 32 bits = node index`.
pub type NodeId = u64;

/// Packs a device index and node index into a [`NodeId`].
#[must_use]
pub const fn make_node_id(dev_index: u32, node_index: u32) -> NodeId {
    ((dev_index as u64) << 32) | node_index as u64
}

/// Extracts the device index from a [`NodeId`].
#[must_use]
pub const fn dev_index_of(id: NodeId) -> u32 {
    (id >> 32) as u32
}

/// Extracts the node index from a [`NodeId`].
#[must_use]
pub const fn node_index_of(id: NodeId) -> u32 {
    (id & 0xFFFF_FFFF) as u32
}

/// `high 16 bits = client id, low 16 bits = per-client nonce`.
pub type StreamId = u32;

/// Packs a client id and per-client nonce into a [`StreamId`].
#[must_use]
pub const fn make_stream_id(client_id: u16, nonce: u16) -> StreamId {
    ((client_id as u32) << 16) | nonce as u32
}

/// Extracts the client id embedded in a [`StreamId`].
#[must_use]
pub const fn client_id_of(id: StreamId) -> u16 {
    (id >> 16) as u16
}

/// Validates that `id` was minted for `client_id`
/// (`spec.md §6`: "`(stream_id >> 16) == client_id`").
#[must_use]
pub const fn stream_belongs_to_client(id: StreamId, client_id: u16) -> bool {
    client_id_of(id) == client_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_round_trips() {
        let id = make_node_id(3, 7);
        assert_eq!(dev_index_of(id), 3);
        assert_eq!(node_index_of(id), 7);
    }

    #[test]
    fn stream_id_embeds_client_id() {
        let id = make_stream_id(42, 9);
        assert!(stream_belongs_to_client(id, 42));
        assert!(!stream_belongs_to_client(id, 43));
    }

    proptest::proptest! {
        #[test]
        fn node_id_packing_round_trips_for_any_pair(dev_index: u32, node_index: u32) {
            let id = make_node_id(dev_index, node_index);
            prop_assert_eq!(dev_index_of(id), dev_index);
            prop_assert_eq!(node_index_of(id), node_index);
        }

        #[test]
        fn stream_id_packing_round_trips_for_any_pair(client_id: u16, nonce: u16) {
            let id = make_stream_id(client_id, nonce);
            prop_assert!(stream_belongs_to_client(id, client_id));
        }
    }
}
