//! Static mapping from replica identity to network address.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::net::{IpAddr, SocketAddr};

use branchmesh_types::ReplicaId;

use crate::error::{RegistryError, RegistryResult};

/// Identity → address map for a fixed replica set.
///
/// Built once at startup from the declared replicas and never mutated. The
/// same registry addresses client sessions to replicas and replicas to their
/// peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaRegistry {
    addresses: BTreeMap<ReplicaId, SocketAddr>,
}

impl ReplicaRegistry {
    /// Derives addresses as `host:(base_port + id)`.
    pub fn from_base_port(
        host: IpAddr,
        base_port: u16,
        ids: impl IntoIterator<Item = ReplicaId>,
    ) -> RegistryResult<Self> {
        let mut pairs = Vec::new();
        for id in ids {
            let port = u32::from(base_port) + id.as_u32();
            let port =
                u16::try_from(port).map_err(|_| RegistryError::PortOverflow { base_port, id })?;
            pairs.push((id, SocketAddr::new(host, port)));
        }
        Self::from_addresses(pairs)
    }

    /// Builds a registry from explicit identity/address pairs.
    pub fn from_addresses(
        pairs: impl IntoIterator<Item = (ReplicaId, SocketAddr)>,
    ) -> RegistryResult<Self> {
        let mut addresses = BTreeMap::new();
        for (id, addr) in pairs {
            match addresses.entry(id) {
                Entry::Vacant(slot) => {
                    slot.insert(addr);
                }
                Entry::Occupied(_) => return Err(RegistryError::DuplicateReplica(id)),
            }
        }

        if addresses.is_empty() {
            return Err(RegistryError::Empty);
        }

        Ok(Self { addresses })
    }

    /// Returns the address of `id`.
    pub fn resolve(&self, id: ReplicaId) -> RegistryResult<SocketAddr> {
        self.addresses
            .get(&id)
            .copied()
            .ok_or(RegistryError::UnknownReplica(id))
    }

    pub fn contains(&self, id: ReplicaId) -> bool {
        self.addresses.contains_key(&id)
    }

    /// Every registered replica except `id`, in ascending identity order.
    pub fn peers_of(&self, id: ReplicaId) -> Vec<ReplicaId> {
        self.addresses
            .keys()
            .copied()
            .filter(|&peer| peer != id)
            .collect()
    }

    /// All registered identities, ascending.
    pub fn ids(&self) -> impl Iterator<Item = ReplicaId> + '_ {
        self.addresses.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use test_case::test_case;

    use super::*;

    fn ids(raw: &[u32]) -> Vec<ReplicaId> {
        raw.iter().copied().map(ReplicaId::new).collect()
    }

    #[test]
    fn base_port_offsets_by_identity() {
        let registry =
            ReplicaRegistry::from_base_port(Ipv4Addr::LOCALHOST.into(), 5000, ids(&[1, 2, 3]))
                .unwrap();

        assert_eq!(
            registry.resolve(ReplicaId::new(2)).unwrap(),
            "127.0.0.1:5002".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(registry.len(), 3);
    }

    #[test_case(1, &[2, 3]; "first replica")]
    #[test_case(2, &[1, 3]; "middle replica")]
    #[test_case(3, &[1, 2]; "last replica")]
    fn peers_exclude_self(id: u32, expected: &[u32]) {
        let registry =
            ReplicaRegistry::from_base_port(Ipv4Addr::LOCALHOST.into(), 5000, ids(&[3, 1, 2]))
                .unwrap();
        assert_eq!(registry.peers_of(ReplicaId::new(id)), ids(expected));
    }

    #[test]
    fn unknown_identity_is_a_configuration_error() {
        let registry =
            ReplicaRegistry::from_base_port(Ipv4Addr::LOCALHOST.into(), 5000, ids(&[1])).unwrap();
        assert!(matches!(
            registry.resolve(ReplicaId::new(9)),
            Err(RegistryError::UnknownReplica(id)) if id == ReplicaId::new(9)
        ));
    }

    #[test]
    fn rejects_port_overflow() {
        let result =
            ReplicaRegistry::from_base_port(Ipv4Addr::LOCALHOST.into(), 65_530, ids(&[1, 10]));
        assert!(matches!(result, Err(RegistryError::PortOverflow { .. })));
    }

    #[test]
    fn rejects_duplicates_and_empty_sets() {
        let addr: SocketAddr = "127.0.0.1:7000".parse().unwrap();
        assert!(matches!(
            ReplicaRegistry::from_addresses([(ReplicaId::new(1), addr), (ReplicaId::new(1), addr)]),
            Err(RegistryError::DuplicateReplica(_))
        ));
        assert!(matches!(
            ReplicaRegistry::from_addresses(Vec::new()),
            Err(RegistryError::Empty)
        ));
    }
}
