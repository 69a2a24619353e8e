use std::collections::HashMap;

use flowvisor::topology::DatapathId;

/// A packet retained on behalf of a controller decision.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedPacket {
    pub dpid: DatapathId,
    /// The switch's own buffer id, when the packet is also held there.
    pub switch_buffer_id: Option<u32>,
    pub data: Vec<u8>,
}

/// Rewrites per-switch buffer ids into one flat namespace. Entries are
/// created when a packet-in arrives from an edge port and die on first
/// use or when the owning switch goes away.
pub struct BufferBridge {
    next_id: u32,
    buffers: HashMap<u32, BufferedPacket>,
}

impl BufferBridge {
    pub fn new() -> BufferBridge {
        BufferBridge {
            next_id: 1,
            buffers: HashMap::new(),
        }
    }

    /// Retain a packet and hand out its virtual buffer id.
    pub fn store(
        &mut self,
        dpid: DatapathId,
        switch_buffer_id: Option<u32>,
        data: Vec<u8>,
    ) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.buffers.insert(
            id,
            BufferedPacket {
                dpid,
                switch_buffer_id,
                data,
            },
        );
        id
    }

    /// Consume a virtual buffer id. The entry is gone afterwards; a second
    /// reference to the same id reports unknown.
    pub fn take(&mut self, id: u32) -> Option<BufferedPacket> {
        self.buffers.remove(&id)
    }

    /// Drop every buffer that originated at a departing switch.
    pub fn purge_switch(&mut self, dpid: DatapathId) {
        self.buffers.retain(|_, b| b.dpid != dpid);
    }

    pub fn contains(&self, id: u32) -> bool {
        self.buffers.contains_key(&id)
    }

    /// The switch a retained packet came from, without consuming it.
    pub fn peek_dpid(&self, id: u32) -> Option<DatapathId> {
        self.buffers.get(&id).map(|b| b.dpid)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
