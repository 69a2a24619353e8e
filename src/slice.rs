use std::fmt;
use std::slice::Iter;

use flowvisor::message::Pattern;
use flowvisor::packet::Packet;
use flowvisor::topology::DatapathId;

/// Identity of a slice and of its controller session.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct SliceId(pub u32);

impl fmt::Display for SliceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "slice-{}", self.0)
    }
}

/// One slice: the flow-space filter deciding what traffic its controller
/// sees, and the virtual datapath id presented to that controller.
#[derive(Debug, Clone)]
pub struct Slice {
    pub id: SliceId,
    pub dpid: DatapathId,
    pub filter: Pattern,
}

/// The unordered set of slices. Duplicate filters are allowed and are not
/// coalesced; a packet matching two slices is delivered twice.
pub struct SliceRegistry {
    next_id: u32,
    slices: Vec<Slice>,
}

impl SliceRegistry {
    pub fn new() -> SliceRegistry {
        SliceRegistry {
            next_id: 1,
            slices: Vec::new(),
        }
    }

    pub fn add(&mut self, filter: Pattern, dpid: DatapathId) -> SliceId {
        let id = SliceId(self.next_id);
        self.next_id += 1;
        self.slices.push(Slice { id, dpid, filter });
        id
    }

    pub fn remove(&mut self, id: SliceId) -> bool {
        let before = self.slices.len();
        self.slices.retain(|s| s.id != id);
        before != self.slices.len()
    }

    pub fn get(&self, id: SliceId) -> Option<&Slice> {
        self.slices.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> Iter<Slice> {
        self.slices.iter()
    }

    pub fn ids(&self) -> Vec<SliceId> {
        self.slices.iter().map(|s| s.id).collect()
    }

    /// Slices whose filter matches a parsed packet that arrived on the
    /// given virtual port. The ingress port is a slicing dimension like
    /// any header field; `matches_packet` leaves it to us.
    pub fn matching_packet(&self, pk: &Packet, in_port: u16) -> Vec<SliceId> {
        self.slices
            .iter()
            .filter(|s| s.filter.in_port.map_or(true, |p| p == in_port))
            .filter(|s| s.filter.matches_packet(pk))
            .map(|s| s.id)
            .collect()
    }

    /// Slices whose flow-space contains the given flow pattern.
    pub fn covering_flow(&self, flow: &Pattern) -> Vec<SliceId> {
        self.slices
            .iter()
            .filter(|s| s.filter.covers(flow))
            .map(|s| s.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_of_type(dl_typ: u16) -> Packet {
        Packet {
            dl_src: 1,
            dl_dst: 2,
            dl_vlan: None,
            dl_vlan_pcp: None,
            dl_typ,
            nw_src: None,
            nw_dst: None,
            nw_proto: None,
            nw_tos: None,
            tp_src: None,
            tp_dst: None,
        }
    }

    fn type_filter(dl_typ: u16) -> Pattern {
        let mut p = Pattern::match_all();
        p.dl_typ = Some(dl_typ);
        p
    }

    #[test]
    fn packets_reach_only_matching_slices() {
        let mut slices = SliceRegistry::new();
        let ipv4 = slices.add(type_filter(0x0800), 0xa);
        let ipv6 = slices.add(type_filter(0x86DD), 0xb);

        assert_eq!(
            slices.matching_packet(&packet_of_type(0x0800), 10),
            vec![ipv4]
        );
        assert_eq!(
            slices.matching_packet(&packet_of_type(0x86DD), 10),
            vec![ipv6]
        );
        assert!(slices.matching_packet(&packet_of_type(0x0806), 10).is_empty());
    }

    #[test]
    fn duplicate_filters_both_deliver() {
        let mut slices = SliceRegistry::new();
        let a = slices.add(type_filter(0x0800), 0xa);
        let b = slices.add(type_filter(0x0800), 0xb);
        assert_eq!(
            slices.matching_packet(&packet_of_type(0x0800), 10),
            vec![a, b]
        );
    }

    #[test]
    fn port_scoped_filter_only_matches_its_port() {
        let mut slices = SliceRegistry::new();
        let mut filter = Pattern::match_all();
        filter.in_port = Some(10);
        let scoped = slices.add(filter, 0xa);

        assert_eq!(
            slices.matching_packet(&packet_of_type(0x0800), 10),
            vec![scoped]
        );
        assert!(slices.matching_packet(&packet_of_type(0x0800), 11).is_empty());
    }

    #[test]
    fn removal_is_by_identity() {
        let mut slices = SliceRegistry::new();
        let a = slices.add(Pattern::match_all(), 0xa);
        let b = slices.add(Pattern::match_all(), 0xb);
        assert!(slices.remove(a));
        assert!(!slices.remove(a));
        assert_eq!(slices.ids(), vec![b]);
    }
}
