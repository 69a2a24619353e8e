use std::collections::{HashMap, HashSet, VecDeque};

use flowvisor::message::PseudoPort;
use flowvisor::packet::{Packet, ETHERTYPE_LLDP};

/// Datapath identifier of a physical switch.
pub type DatapathId = u64;

/// One switch traversal on a realized path: enter at `in_port`, leave
/// through `out`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hop {
    pub dpid: DatapathId,
    pub in_port: u16,
    pub out: PseudoPort,
}

impl Hop {
    pub fn new(dpid: DatapathId, in_port: u16, out_port: u16) -> Hop {
        Hop {
            dpid,
            in_port,
            out: PseudoPort::PhysicalPort(out_port),
        }
    }
}

/// The topology collaborator consulted by the virtualization engine. It
/// answers path queries and owns the knowledge of which ports carry
/// inter-switch links.
pub trait Topology {
    /// A switch channel came up.
    fn add_channel(&mut self, dpid: DatapathId);
    /// A physical port was reported by a switch.
    fn add_port(&mut self, dpid: DatapathId, port: u16);
    /// A physical port went away.
    fn remove_port(&mut self, dpid: DatapathId, port: u16);
    /// A switch left; forget it and everything attached to it.
    fn remove_dpid(&mut self, dpid: DatapathId);
    /// Hops realizing a unicast path from an ingress to an egress port.
    /// Empty when no path is known.
    fn find_path(
        &self,
        dpid_in: DatapathId,
        port_in: u16,
        dpid_out: DatapathId,
        port_out: u16,
    ) -> Vec<Hop>;
    /// Hops realizing a broadcast from the ingress along the spanning
    /// tree. May be empty; the caller then floods the origin switch only.
    fn broadcast_hops(&self, _dpid_in: DatapathId, _port_in: u16) -> Vec<Hop> {
        vec![]
    }
    /// True when the port carries an inter-switch link rather than hosts.
    fn is_transit_port(&self, dpid: DatapathId, port: u16) -> bool;
    /// Offer an incoming frame to the discovery layer. Returns true when
    /// the frame was claimed and must not reach any controller.
    fn process_lldp(&mut self, dpid: DatapathId, port: u16, frame: &[u8]) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Link {
    a: (DatapathId, u16),
    b: (DatapathId, u16),
}

/// Topology over operator-declared inter-switch links. There is no LLDP
/// inference here: links come from configuration, LLDP frames arriving on
/// a declared link port are absorbed as discovery chatter.
pub struct FabricTopology {
    links: Vec<Link>,
    channels: HashSet<DatapathId>,
}

impl FabricTopology {
    pub fn new() -> FabricTopology {
        FabricTopology {
            links: Vec::new(),
            channels: HashSet::new(),
        }
    }

    /// Declare a bidirectional inter-switch link.
    pub fn add_link(&mut self, a_dpid: DatapathId, a_port: u16, b_dpid: DatapathId, b_port: u16) {
        let link = Link {
            a: (a_dpid, a_port),
            b: (b_dpid, b_port),
        };
        if !self.links.contains(&link) {
            self.links.push(link);
        }
    }

    /// Adjacency over links whose two endpoints are both live channels:
    /// dpid -> [(egress port, peer dpid, peer ingress port)].
    fn adjacency(&self) -> HashMap<DatapathId, Vec<(u16, DatapathId, u16)>> {
        let mut adj: HashMap<DatapathId, Vec<(u16, DatapathId, u16)>> = HashMap::new();
        for link in &self.links {
            let (a, b) = (link.a, link.b);
            if !self.channels.contains(&a.0) || !self.channels.contains(&b.0) {
                continue;
            }
            adj.entry(a.0).or_insert_with(Vec::new).push((a.1, b.0, b.1));
            adj.entry(b.0).or_insert_with(Vec::new).push((b.1, a.0, a.1));
        }
        adj
    }
}

impl Topology for FabricTopology {
    fn add_channel(&mut self, dpid: DatapathId) {
        self.channels.insert(dpid);
    }

    // links are operator-declared, so per-port reports carry no extra
    // information here
    fn add_port(&mut self, _dpid: DatapathId, _port: u16) {}

    fn remove_port(&mut self, _dpid: DatapathId, _port: u16) {}

    fn remove_dpid(&mut self, dpid: DatapathId) {
        self.channels.remove(&dpid);
    }

    fn find_path(
        &self,
        dpid_in: DatapathId,
        port_in: u16,
        dpid_out: DatapathId,
        port_out: u16,
    ) -> Vec<Hop> {
        if dpid_in == dpid_out {
            return vec![Hop::new(dpid_in, port_in, port_out)];
        }
        let adj = self.adjacency();

        // breadth-first search, remembering the link each dpid was reached by
        let mut prev: HashMap<DatapathId, (DatapathId, u16, u16)> = HashMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(dpid_in);
        let mut seen = HashSet::new();
        seen.insert(dpid_in);
        while let Some(dpid) = queue.pop_front() {
            if dpid == dpid_out {
                break;
            }
            if let Some(neighbors) = adj.get(&dpid) {
                for &(egress, peer, ingress) in neighbors {
                    if seen.insert(peer) {
                        prev.insert(peer, (dpid, egress, ingress));
                        queue.push_back(peer);
                    }
                }
            }
        }
        if !prev.contains_key(&dpid_out) {
            return vec![];
        }

        // walk back from the egress switch, then stitch hops front to back
        let mut segments = vec![];
        let mut at = dpid_out;
        while at != dpid_in {
            let (from, egress, ingress) = prev[&at];
            segments.push((from, egress, at, ingress));
            at = from;
        }
        segments.reverse();

        let mut hops = Vec::with_capacity(segments.len() + 1);
        let mut entry = port_in;
        for &(from, egress, _to, ingress) in &segments {
            hops.push(Hop::new(from, entry, egress));
            entry = ingress;
        }
        hops.push(Hop::new(dpid_out, entry, port_out));
        hops
    }

    fn is_transit_port(&self, dpid: DatapathId, port: u16) -> bool {
        self.links
            .iter()
            .any(|l| l.a == (dpid, port) || l.b == (dpid, port))
    }

    fn process_lldp(&mut self, dpid: DatapathId, port: u16, frame: &[u8]) -> bool {
        let is_lldp = match Packet::parse(frame) {
            Some(pk) => pk.dl_typ == ETHERTYPE_LLDP,
            None => false,
        };
        is_lldp && self.is_transit_port(dpid, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_switch_fabric() -> FabricTopology {
        let mut topo = FabricTopology::new();
        topo.add_channel(1);
        topo.add_channel(2);
        topo.add_link(1, 3, 2, 3);
        topo
    }

    #[test]
    fn same_switch_path_is_one_hop() {
        let topo = two_switch_fabric();
        assert_eq!(topo.find_path(1, 1, 1, 2), vec![Hop::new(1, 1, 2)]);
    }

    #[test]
    fn cross_switch_path_traverses_the_link() {
        let topo = two_switch_fabric();
        assert_eq!(
            topo.find_path(1, 1, 2, 2),
            vec![Hop::new(1, 1, 3), Hop::new(2, 3, 2)]
        );
    }

    #[test]
    fn path_via_intermediate_switch() {
        let mut topo = two_switch_fabric();
        topo.add_channel(3);
        topo.add_link(2, 4, 3, 1);
        assert_eq!(
            topo.find_path(1, 1, 3, 2),
            vec![Hop::new(1, 1, 3), Hop::new(2, 3, 4), Hop::new(3, 1, 2)]
        );
    }

    #[test]
    fn no_path_to_unknown_switch() {
        let topo = two_switch_fabric();
        assert!(topo.find_path(1, 1, 9, 2).is_empty());
    }

    #[test]
    fn link_down_when_channel_leaves() {
        let mut topo = two_switch_fabric();
        topo.remove_dpid(2);
        assert!(topo.find_path(1, 1, 2, 2).is_empty());
    }

    #[test]
    fn transit_ports_are_link_endpoints() {
        let topo = two_switch_fabric();
        assert!(topo.is_transit_port(1, 3));
        assert!(topo.is_transit_port(2, 3));
        assert!(!topo.is_transit_port(1, 1));
    }

    #[test]
    fn lldp_on_link_port_is_claimed() {
        let mut topo = two_switch_fabric();
        let mut frame = vec![0xff; 12];
        frame.extend_from_slice(&[0x88, 0xcc, 0, 0]);
        assert!(topo.process_lldp(1, 3, &frame));
        assert!(!topo.process_lldp(1, 1, &frame));
        let mut ip = vec![0xff; 12];
        ip.extend_from_slice(&[0x08, 0x00]);
        assert!(!topo.process_lldp(1, 3, &ip));
    }
}
