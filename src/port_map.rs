use std::collections::HashMap;

use flowvisor::message::PortDesc;
use flowvisor::topology::DatapathId;
use flowvisor::translate::TranslationError;

/// Virtual port numbers start here; 0..9 stay clear of the reserved
/// OpenFlow constants and of switch-local conventions.
pub const FIRST_VIRTUAL_PORT: u16 = 10;

/// The controller-visible port namespace: a dense, injective mapping from
/// virtual port numbers to `(dpid, physical port)` pairs, with the
/// physical port descriptor cached for advertisement.
pub struct PortMap {
    next_virtual: u16,
    by_virtual: HashMap<u16, (DatapathId, u16, PortDesc)>,
    by_physical: HashMap<(DatapathId, u16), u16>,
}

impl PortMap {
    pub fn new() -> PortMap {
        PortMap {
            next_virtual: FIRST_VIRTUAL_PORT,
            by_virtual: HashMap::new(),
            by_physical: HashMap::new(),
        }
    }

    /// Map a newly reported physical port, returning its virtual number.
    /// Re-reporting a known port refreshes the cached descriptor and keeps
    /// the existing mapping.
    pub fn add_port(&mut self, dpid: DatapathId, phys: u16, desc: PortDesc) -> u16 {
        if let Some(&virt) = self.by_physical.get(&(dpid, phys)) {
            if let Some(entry) = self.by_virtual.get_mut(&virt) {
                entry.2 = desc;
            }
            return virt;
        }
        let virt = self.next_virtual;
        self.next_virtual += 1;
        self.by_virtual.insert(virt, (dpid, phys, desc));
        self.by_physical.insert((dpid, phys), virt);
        virt
    }

    /// Unmap a physical port. Returns the virtual number and descriptor it
    /// had, for the port-status notification toward controllers.
    pub fn remove_port(&mut self, dpid: DatapathId, phys: u16) -> Option<(u16, PortDesc)> {
        let virt = self.by_physical.remove(&(dpid, phys))?;
        self.by_virtual
            .remove(&virt)
            .map(|(_, _, desc)| (virt, desc))
    }

    /// Unmap every port of a departing switch.
    pub fn remove_switch(&mut self, dpid: DatapathId) -> Vec<(u16, PortDesc)> {
        let virts: Vec<u16> = self
            .by_virtual
            .iter()
            .filter(|&(_, entry)| entry.0 == dpid)
            .map(|(&virt, _)| virt)
            .collect();
        let mut removed = Vec::with_capacity(virts.len());
        for virt in virts {
            if let Some((d, p, desc)) = self.by_virtual.remove(&virt) {
                self.by_physical.remove(&(d, p));
                removed.push((virt, desc));
            }
        }
        removed.sort_by_key(|r| r.0);
        removed
    }

    pub fn virt_of_phys(&self, dpid: DatapathId, phys: u16) -> Option<u16> {
        self.by_physical.get(&(dpid, phys)).cloned()
    }

    pub fn phys_of_virt(&self, virt: u16) -> Option<(DatapathId, u16)> {
        self.by_virtual.get(&virt).map(|&(d, p, _)| (d, p))
    }

    /// Resolve a controller-supplied port that must exist.
    pub fn phys_of_virt_strict(&self, virt: u16) -> Result<(DatapathId, u16), TranslationError> {
        self.phys_of_virt(virt)
            .ok_or(TranslationError::BadOutPort(virt))
    }

    /// The descriptor of a mapped port, renumbered to its virtual id.
    pub fn desc_of_virt(&self, virt: u16) -> Option<PortDesc> {
        self.by_virtual.get(&virt).map(|&(_, _, ref desc)| {
            let mut desc = desc.clone();
            desc.port_no = virt;
            desc
        })
    }

    /// All mapped ports as controller-visible descriptors, sorted by
    /// virtual number. This is the port list of the synthesized features
    /// reply.
    pub fn controller_ports(&self) -> Vec<PortDesc> {
        let mut virts: Vec<u16> = self.by_virtual.keys().cloned().collect();
        virts.sort();
        virts
            .into_iter()
            .filter_map(|v| self.desc_of_virt(v))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_virtual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_virtual.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowvisor::message::{PortConfig, PortFeatures, PortState, StpState};

    fn desc(port_no: u16) -> PortDesc {
        let feats = PortFeatures {
            f_10mbhd: false,
            f_10mbfd: false,
            f_100mbhd: false,
            f_100mbfd: true,
            f_1gbhd: false,
            f_1gbfd: true,
            f_10gbfd: false,
            copper: true,
            fiber: false,
            autoneg: true,
            pause: false,
            pause_asym: false,
        };
        PortDesc {
            port_no,
            hw_addr: 0x00_00_5e_00_53_00 + u64::from(port_no),
            name: format!("eth{}", port_no),
            config: PortConfig {
                down: false,
                no_stp: false,
                no_recv: false,
                no_recv_stp: false,
                no_flood: false,
                no_fwd: false,
                no_packet_in: false,
            },
            state: PortState {
                down: false,
                stp_state: StpState::Forward,
            },
            curr: feats,
            advertised: feats,
            supported: feats,
            peer: feats,
        }
    }

    #[test]
    fn allocation_starts_at_ten_and_is_dense() {
        let mut map = PortMap::new();
        assert_eq!(map.add_port(1, 1, desc(1)), 10);
        assert_eq!(map.add_port(1, 2, desc(2)), 11);
        assert_eq!(map.add_port(2, 1, desc(1)), 12);
    }

    #[test]
    fn mapping_is_injective_and_invertible() {
        let mut map = PortMap::new();
        let v1 = map.add_port(1, 1, desc(1));
        let v2 = map.add_port(2, 1, desc(1));
        assert_ne!(v1, v2);
        assert_eq!(map.phys_of_virt(v1), Some((1, 1)));
        assert_eq!(map.phys_of_virt(v2), Some((2, 1)));
        assert_eq!(map.virt_of_phys(1, 1), Some(v1));
        assert_eq!(map.virt_of_phys(2, 1), Some(v2));
    }

    #[test]
    fn readding_a_port_keeps_its_number() {
        let mut map = PortMap::new();
        let v = map.add_port(1, 1, desc(1));
        assert_eq!(map.add_port(1, 1, desc(1)), v);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn strict_lookup_rejects_unknown_ports() {
        let map = PortMap::new();
        match map.phys_of_virt_strict(10) {
            Err(TranslationError::BadOutPort(10)) => {}
            other => panic!("expected BadOutPort, got {:?}", other),
        }
    }

    #[test]
    fn switch_removal_clears_only_its_ports() {
        let mut map = PortMap::new();
        map.add_port(1, 1, desc(1));
        map.add_port(1, 2, desc(2));
        let keep = map.add_port(2, 1, desc(1));
        let removed = map.remove_switch(1);
        assert_eq!(removed.len(), 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.phys_of_virt(keep), Some((2, 1)));
        assert_eq!(map.virt_of_phys(1, 1), None);
    }

    #[test]
    fn controller_ports_carry_virtual_numbers() {
        let mut map = PortMap::new();
        map.add_port(1, 1, desc(1));
        map.add_port(1, 2, desc(2));
        let ports = map.controller_ports();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].port_no, 10);
        assert_eq!(ports[1].port_no, 11);
        assert_eq!(ports[1].name, "eth2");
    }
}
