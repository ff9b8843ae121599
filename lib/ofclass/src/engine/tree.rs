// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The tree classifier.
//!
//! Each level of the tree indexes flows on one discriminator field.
//! A flow with a usable predicate on that field goes below the child
//! keyed by the predicate's value; every other flow goes below the
//! level's fallback. The leaves are linear classifiers which no longer
//! test the fields their path has already decided.
//!
//! A lookup visits, at each level, the children keyed by the packet's
//! value of the field and then the fallback, passing the best rank
//! found so far down as the floor every later hit must beat.
//!
//! The shape of the tree is fixed:
//!
//! ```text
//! [InPort] -> VlanVid -> EthType -+- 0x0800 -> Ipv4Dst -> Ipv4Src -> leaf
//! [Metadata] --------->           +- 0x86dd -> IpProto -> leaf
//!                                 +- 0x8847, 0x8848 -> MplsLabel -> leaf
//!                                 +- other, fallback -> leaf
//! ```
//!
//! The root is `VlanVid` unless the classifier is configured to start
//! at `InPort` or `Metadata`.
//!
//! Nodes are shared between copies of a tree and copied on write: a
//! change to a copy duplicates the nodes on the path to the flow's leaf
//! and leaves every other subtree shared.

use super::classifier::Classify;
use super::field::ETHER_TYPE_IPV4;
use super::field::ETHER_TYPE_IPV6;
use super::field::ETHER_TYPE_MPLS;
use super::field::ETHER_TYPE_MPLS_MCAST;
use super::field::L3Kind;
use super::field::layout;
use super::flow::FlowEntry;
use super::flow::FlowRef;
use super::flow::Rank;
use super::linear::LinearClassifier;
use super::packet::MAX_ETH_TYPES;
use super::packet::PacketView;
use crate::api::ClassifierError;
use crate::api::FieldSet;
use crate::api::FlowId;
use crate::api::OxmField;
use crate::api::Result;
use crate::api::TreeRoot;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::hash_map::Entry;
use std::sync::Arc;

/// The packet keys of one level. Only `EthType` yields more than one.
type Keys = heapless::Vec<u128, MAX_ETH_TYPES>;

/// The levels above a node, with the key taken at each; `None` for a
/// fallback.
type Path = Vec<(Discriminator, Option<(u128, u128)>)>;

/// A field a tree level indexes flows on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Discriminator {
    InPort,
    Metadata,
    VlanVid,
    EthType,
    Ipv4Dst,
    Ipv4Src,
    IpProto,
    MplsLabel,
}

impl Discriminator {
    pub fn field(self) -> OxmField {
        match self {
            Self::InPort => OxmField::InPort,
            Self::Metadata => OxmField::Metadata,
            Self::VlanVid => OxmField::VlanVid,
            Self::EthType => OxmField::EthType,
            Self::Ipv4Dst => OxmField::Ipv4Dst,
            Self::Ipv4Src => OxmField::Ipv4Src,
            Self::IpProto => OxmField::IpProto,
            Self::MplsLabel => OxmField::MplsLabel,
        }
    }

    /// Whether the level indexes masked predicates, one hash table per
    /// distinct mask.
    pub fn masked(self) -> bool {
        matches!(self, Self::Metadata | Self::Ipv4Dst | Self::Ipv4Src)
    }

    /// The level below the child keyed by `key`; `None` for a leaf.
    pub fn child(self, key: u128) -> Option<Self> {
        match self {
            Self::InPort => Some(Self::VlanVid),
            Self::Metadata | Self::VlanVid => Some(Self::EthType),
            Self::EthType => match key as u16 {
                ETHER_TYPE_IPV4 => Some(Self::Ipv4Dst),
                ETHER_TYPE_IPV6 => Some(Self::IpProto),
                ETHER_TYPE_MPLS | ETHER_TYPE_MPLS_MCAST => {
                    Some(Self::MplsLabel)
                }
                _ => None,
            },
            Self::Ipv4Dst => Some(Self::Ipv4Src),
            Self::Ipv4Src | Self::IpProto | Self::MplsLabel => None,
        }
    }

    /// The level below the fallback; `None` for a leaf.
    pub fn fallback(self) -> Option<Self> {
        match self {
            Self::InPort => Some(Self::VlanVid),
            Self::Metadata | Self::VlanVid => Some(Self::EthType),
            Self::Ipv4Dst => Some(Self::Ipv4Src),
            Self::EthType | Self::Ipv4Src | Self::IpProto | Self::MplsLabel => {
                None
            }
        }
    }

    /// The `(key, mask)` a flow is indexed under, or `None` when it
    /// belongs below the fallback.
    pub fn flow_key(self, flow: &FlowEntry) -> Option<(u128, u128)> {
        let pred = flow.predicate(self.field())?;
        if self.masked() {
            let mask = pred.mask_u128();
            if mask == 0 {
                return None;
            }
            Some((pred.value_u128(), mask))
        } else if pred.is_masked() {
            None
        } else {
            Some((pred.value_u128(), self.field().value_bits()))
        }
    }

    /// The packet's value of the field, shifted down to the predicate's
    /// value space.
    fn packet_value(self, pkt: &PacketView) -> Option<u128> {
        let at = layout(self.field(), L3Kind::V4)?;
        pkt.read(&at).map(|v| v >> at.shift)
    }

    /// Every key the packet selects at this level. An MPLS or PBB
    /// packet presents both its outer and its inner ethertype.
    fn packet_keys(self, pkt: &PacketView) -> Keys {
        let mut keys = Keys::new();
        if self == Self::EthType {
            for ty in pkt.eth_types() {
                let _ = keys.push(u128::from(*ty));
            }
        } else if let Some(v) = self.packet_value(pkt) {
            let _ = keys.push(v);
        }
        keys
    }
}

impl From<TreeRoot> for Discriminator {
    fn from(root: TreeRoot) -> Self {
        match root {
            TreeRoot::Vlan => Self::VlanVid,
            TreeRoot::InPort => Self::InPort,
            TreeRoot::Metadata => Self::Metadata,
        }
    }
}

fn decrement(count: &mut usize) -> Result<()> {
    debug_assert!(*count > 0, "tree flow count underflow");
    *count = count.checked_sub(1).ok_or_else(|| {
        ClassifierError::StructuralInconsistency(
            "tree flow count underflow".into(),
        )
    })?;
    Ok(())
}

#[derive(Clone)]
enum Node {
    Leaf(Arc<LinearClassifier>),
    Index(Arc<Index>),
}

impl Node {
    fn new(disc: Option<Discriminator>, except: FieldSet) -> Self {
        match disc {
            Some(d) => Self::Index(Arc::new(Index::new(d, except))),
            None => {
                Self::Leaf(Arc::new(LinearClassifier::with_except(except)))
            }
        }
    }

    fn add(&mut self, flow: &FlowRef) -> Result<()> {
        match self {
            Self::Leaf(l) => Arc::make_mut(l).add(flow),
            Self::Index(ix) => Arc::make_mut(ix).add(flow),
        }
    }

    /// Remove `flow`. A failed removal may have copied nodes but
    /// leaves their contents unchanged.
    fn remove(&mut self, flow: &FlowEntry) -> Result<FlowRef> {
        match self {
            Self::Leaf(l) => Arc::make_mut(l).remove(flow),
            Self::Index(ix) => Arc::make_mut(ix).remove(flow),
        }
    }

    fn lookup(
        &self,
        pkt: &PacketView,
        floor: Option<Rank>,
    ) -> Option<&FlowRef> {
        match self {
            Self::Leaf(l) => l.lookup(pkt, floor),
            Self::Index(ix) => ix.lookup(pkt, floor),
        }
    }

    fn find(&self, probe: &FlowEntry) -> Option<&FlowRef> {
        match self {
            Self::Leaf(l) => l.find(probe),
            Self::Index(ix) => ix.find(probe),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Leaf(l) => l.len(),
            Self::Index(ix) => ix.flow_count,
        }
    }

    fn collect(&self, out: &mut Vec<FlowRef>) {
        match self {
            Self::Leaf(l) => out.extend(l.iter().cloned()),
            Self::Index(ix) => {
                ix.for_each_child(|c| c.collect(out));
                ix.fallback.collect(out);
            }
        }
    }

    /// Verify the subtree and return the number of flows in it.
    fn check(
        &self,
        path: &mut Path,
        seen: &mut HashSet<FlowId>,
    ) -> Result<usize> {
        match self {
            Self::Leaf(l) => {
                l.check_order()?;
                for flow in l.iter() {
                    if !seen.insert(flow.id()) {
                        return Err(inconsistent(format!(
                            "flow {} reachable twice",
                            flow.id()
                        )));
                    }
                    for (disc, key) in path.iter() {
                        if disc.flow_key(flow) != *key {
                            return Err(inconsistent(format!(
                                "flow {} misplaced at {disc:?}",
                                flow.id()
                            )));
                        }
                    }
                }
                Ok(l.len())
            }
            Self::Index(ix) => ix.check(path, seen),
        }
    }
}

fn inconsistent(msg: String) -> ClassifierError {
    ClassifierError::StructuralInconsistency(msg)
}

#[derive(Clone)]
struct MaskBranch {
    mask: u128,
    children: HashMap<u128, Node>,
    flow_count: usize,
}

#[derive(Clone)]
enum Children {
    Exact(HashMap<u128, Node>),
    /// Ordered by descending mask length, so that longer (usually more
    /// specific) masks raise the floor early.
    Masked(Vec<MaskBranch>),
}

#[derive(Clone)]
struct Index {
    disc: Discriminator,
    /// The fields decided on the path to this index.
    except: FieldSet,
    children: Children,
    fallback: Node,
    flow_count: usize,
}

impl Index {
    fn new(disc: Discriminator, except: FieldSet) -> Self {
        let children = if disc.masked() {
            Children::Masked(Vec::new())
        } else {
            Children::Exact(HashMap::new())
        };

        Self {
            disc,
            except,
            children,
            fallback: Node::new(disc.fallback(), except),
            flow_count: 0,
        }
    }

    fn add(&mut self, flow: &FlowRef) -> Result<()> {
        match self.disc.flow_key(flow) {
            None => self.fallback.add(flow)?,
            Some((key, mask)) => {
                let child = self.disc.child(key);
                let except = self.except.with(self.disc.field());

                match &mut self.children {
                    Children::Exact(map) => {
                        add_keyed(map, key, child, except, flow)?
                    }

                    Children::Masked(branches) => {
                        match branches.iter().position(|b| b.mask == mask) {
                            Some(i) => {
                                let b = &mut branches[i];
                                let map = &mut b.children;
                                add_keyed(map, key, child, except, flow)?;
                                b.flow_count += 1;
                            }

                            None => {
                                branches.try_reserve(1).map_err(|_| {
                                    ClassifierError::OutOfMemory
                                })?;
                                let mut b = MaskBranch {
                                    mask,
                                    children: HashMap::new(),
                                    flow_count: 0,
                                };
                                let map = &mut b.children;
                                add_keyed(map, key, child, except, flow)?;
                                b.flow_count = 1;

                                let len = mask.count_ones();
                                let at = branches.partition_point(|o| {
                                    o.mask.count_ones() >= len
                                });
                                branches.insert(at, b);
                            }
                        }
                    }
                }
            }
        }

        self.flow_count += 1;
        Ok(())
    }

    fn remove(&mut self, flow: &FlowEntry) -> Result<FlowRef> {
        let removed = match self.disc.flow_key(flow) {
            None => self.fallback.remove(flow)?,
            Some((key, mask)) => match &mut self.children {
                Children::Exact(map) => remove_keyed(map, key, flow)?,

                Children::Masked(branches) => {
                    let i = branches
                        .iter()
                        .position(|b| b.mask == mask)
                        .ok_or(ClassifierError::NotFound)?;
                    let b = &mut branches[i];
                    let removed = remove_keyed(&mut b.children, key, flow)?;
                    decrement(&mut b.flow_count)?;
                    if b.flow_count == 0 {
                        branches.remove(i);
                    }
                    removed
                }
            },
        };

        decrement(&mut self.flow_count)?;
        Ok(removed)
    }

    fn lookup(
        &self,
        pkt: &PacketView,
        floor: Option<Rank>,
    ) -> Option<&FlowRef> {
        let mut floor = floor;
        let mut best = None;

        match &self.children {
            Children::Exact(map) => {
                for key in self.disc.packet_keys(pkt) {
                    let hit =
                        map.get(&key).and_then(|c| c.lookup(pkt, floor));
                    if let Some(hit) = hit {
                        floor = Some(hit.rank());
                        best = Some(hit);
                    }
                }
            }

            Children::Masked(branches) => {
                if let Some(v) = self.disc.packet_value(pkt) {
                    for b in branches {
                        let hit = b
                            .children
                            .get(&(v & b.mask))
                            .and_then(|c| c.lookup(pkt, floor));
                        if let Some(hit) = hit {
                            floor = Some(hit.rank());
                            best = Some(hit);
                        }
                    }
                }
            }
        }

        // Hits only ever beat the floor they were handed, so a fallback
        // hit beats everything found above.
        self.fallback.lookup(pkt, floor).or(best)
    }

    fn find(&self, probe: &FlowEntry) -> Option<&FlowRef> {
        match self.disc.flow_key(probe) {
            None => self.fallback.find(probe),
            Some((key, mask)) => match &self.children {
                Children::Exact(map) => map.get(&key)?.find(probe),
                Children::Masked(branches) => branches
                    .iter()
                    .find(|b| b.mask == mask)?
                    .children
                    .get(&key)?
                    .find(probe),
            },
        }
    }

    fn for_each_child<F: FnMut(&Node)>(&self, mut f: F) {
        match &self.children {
            Children::Exact(map) => map.values().for_each(f),
            Children::Masked(branches) => {
                for b in branches {
                    b.children.values().for_each(&mut f);
                }
            }
        }
    }

    fn check(
        &self,
        path: &mut Path,
        seen: &mut HashSet<FlowId>,
    ) -> Result<usize> {
        let mut total = 0;

        match &self.children {
            Children::Exact(map) => {
                let mask = self.disc.field().value_bits();
                total += self.check_keyed(map, mask, path, seen)?;
            }

            Children::Masked(branches) => {
                for b in branches {
                    let n = self.check_keyed(&b.children, b.mask, path, seen)?;
                    if n != b.flow_count || n == 0 {
                        return Err(inconsistent(format!(
                            "mask {:#x} counts {} flows, holds {n}",
                            b.mask, b.flow_count
                        )));
                    }
                    total += n;
                }
            }
        }

        path.push((self.disc, None));
        let n = self.fallback.check(path, seen);
        path.pop();
        total += n?;

        if total != self.flow_count {
            return Err(inconsistent(format!(
                "{:?} counts {} flows, holds {total}",
                self.disc, self.flow_count
            )));
        }
        Ok(total)
    }

    fn check_keyed(
        &self,
        map: &HashMap<u128, Node>,
        mask: u128,
        path: &mut Path,
        seen: &mut HashSet<FlowId>,
    ) -> Result<usize> {
        let mut sum = 0;
        for (key, child) in map {
            if child.len() == 0 {
                return Err(inconsistent(format!(
                    "empty child {key:#x} at {:?}",
                    self.disc
                )));
            }

            path.push((self.disc, Some((*key, mask))));
            let n = child.check(path, seen);
            path.pop();
            let n = n?;

            if n != child.len() {
                return Err(inconsistent(format!(
                    "child {key:#x} at {:?} counts {} flows, holds {n}",
                    self.disc,
                    child.len()
                )));
            }
            sum += n;
        }
        Ok(sum)
    }
}

fn add_keyed(
    map: &mut HashMap<u128, Node>,
    key: u128,
    child: Option<Discriminator>,
    except: FieldSet,
    flow: &FlowRef,
) -> Result<()> {
    map.try_reserve(1).map_err(|_| ClassifierError::OutOfMemory)?;
    match map.entry(key) {
        Entry::Occupied(mut o) => o.get_mut().add(flow),
        Entry::Vacant(v) => {
            // Only a child holding the flow is kept.
            let mut node = Node::new(child, except);
            node.add(flow)?;
            v.insert(node);
            Ok(())
        }
    }
}

fn remove_keyed(
    map: &mut HashMap<u128, Node>,
    key: u128,
    flow: &FlowEntry,
) -> Result<FlowRef> {
    let child = map.get_mut(&key).ok_or(ClassifierError::NotFound)?;
    let removed = child.remove(flow)?;
    if child.len() == 0 {
        map.remove(&key);
    }
    Ok(removed)
}

#[derive(Clone)]
pub struct TreeClassifier {
    root: Node,
}

impl TreeClassifier {
    pub fn new(root: TreeRoot) -> Self {
        Self { root: Node::new(Some(root.into()), FieldSet::EMPTY) }
    }

    /// Walk the whole tree, verifying that every flow is reachable along
    /// exactly one path, that the path agrees with the flow's
    /// predicates, and that every count equals the flows beneath it.
    pub fn check_invariants(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let n = self.root.check(&mut Vec::new(), &mut seen)?;
        if n != self.root.len() {
            return Err(inconsistent(format!(
                "root counts {} flows, holds {n}",
                self.root.len()
            )));
        }
        Ok(())
    }
}

impl Classify for TreeClassifier {
    fn add(&mut self, flow: &FlowRef) -> Result<()> {
        self.root.add(flow)
    }

    fn remove(&mut self, flow: &FlowEntry) -> Result<FlowRef> {
        self.root.remove(flow)
    }

    fn lookup(
        &self,
        pkt: &PacketView,
        floor: Option<Rank>,
    ) -> Option<&FlowRef> {
        self.root.lookup(pkt, floor)
    }

    fn find(&self, probe: &FlowEntry) -> Option<&FlowRef> {
        self.root.find(probe)
    }

    fn len(&self) -> usize {
        self.root.len()
    }

    fn flows(&self) -> Vec<FlowRef> {
        let mut out = Vec::with_capacity(self.len());
        self.root.collect(&mut out);
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::FlowSpec;
    use crate::api::MatchPredicate;
    use std::sync::Arc;

    fn flow(id: u64, spec: FlowSpec) -> FlowRef {
        Arc::new(FlowEntry::new(FlowId(id), spec).unwrap())
    }

    fn ipv4_body(dst: [u8; 4]) -> Vec<u8> {
        let mut b = vec![0x45, 0, 0, 20, 0, 0, 0, 0, 64, 6, 0, 0, 1, 1, 1, 1];
        b.extend_from_slice(&dst);
        b
    }

    fn ipv4(dst: [u8; 4]) -> Vec<u8> {
        let mut f = vec![0u8; 12];
        f.extend_from_slice(&ETHER_TYPE_IPV4.to_be_bytes());
        f.extend_from_slice(&ipv4_body(dst));
        f
    }

    fn mpls_ipv4(label: u32, dst: [u8; 4]) -> Vec<u8> {
        let mut f = vec![0u8; 12];
        f.extend_from_slice(&ETHER_TYPE_MPLS.to_be_bytes());
        // Bottom of stack, TTL 64.
        f.extend_from_slice(&((label << 12) | 0x140).to_be_bytes());
        f.extend_from_slice(&ipv4_body(dst));
        f
    }

    fn net(s: &str) -> MatchPredicate {
        MatchPredicate::ipv4_dst_prefix(s.parse().unwrap())
    }

    #[test]
    fn mpls_packet_visits_both_ethertypes() {
        let mut tree = TreeClassifier::new(TreeRoot::Vlan);
        let v4 = flow(
            1,
            FlowSpec::new(10)
                .with_match(MatchPredicate::eth_type(ETHER_TYPE_IPV4))
                .with_match(net("10.0.0.0/8")),
        );
        let label = flow(
            2,
            FlowSpec::new(20)
                .with_match(MatchPredicate::eth_type(ETHER_TYPE_MPLS))
                .with_match(MatchPredicate::mpls_label(16)),
        );
        tree.add(&v4).unwrap();
        tree.add(&label).unwrap();
        tree.check_invariants().unwrap();

        let f = mpls_ipv4(16, [10, 1, 1, 1]);
        let pkt = PacketView::parse(&f, 1).unwrap();
        assert_eq!(tree.lookup(&pkt, None).unwrap().id(), FlowId(2));

        let f = mpls_ipv4(17, [10, 1, 1, 1]);
        let pkt = PacketView::parse(&f, 1).unwrap();
        assert_eq!(tree.lookup(&pkt, None).unwrap().id(), FlowId(1));

        tree.remove(&label).unwrap();
        let f = mpls_ipv4(16, [10, 1, 1, 1]);
        let pkt = PacketView::parse(&f, 1).unwrap();
        assert_eq!(tree.lookup(&pkt, None).unwrap().id(), FlowId(1));
        tree.check_invariants().unwrap();
    }

    #[test]
    fn masked_level_prefers_rank_over_mask_length() {
        let mut tree = TreeClassifier::new(TreeRoot::Vlan);
        let ip = MatchPredicate::eth_type(ETHER_TYPE_IPV4);
        let wide = flow(
            1,
            FlowSpec::new(30)
                .with_match(ip.clone())
                .with_match(net("10.0.0.0/8")),
        );
        let narrow = flow(
            2,
            FlowSpec::new(20).with_match(ip).with_match(net("10.1.0.0/16")),
        );
        let any = flow(3, FlowSpec::new(25));
        for f in [&narrow, &any, &wide] {
            tree.add(f).unwrap();
        }
        tree.check_invariants().unwrap();

        let f = ipv4([10, 1, 2, 3]);
        let pkt = PacketView::parse(&f, 1).unwrap();
        assert_eq!(tree.lookup(&pkt, None).unwrap().id(), FlowId(1));

        tree.remove(&wide).unwrap();
        assert_eq!(tree.lookup(&pkt, None).unwrap().id(), FlowId(3));

        tree.remove(&any).unwrap();
        assert_eq!(tree.lookup(&pkt, None).unwrap().id(), FlowId(2));

        let f = ipv4([10, 2, 0, 1]);
        let pkt = PacketView::parse(&f, 1).unwrap();
        assert!(tree.lookup(&pkt, None).is_none());
    }

    #[test]
    fn empty_children_are_destroyed() {
        let mut tree = TreeClassifier::new(TreeRoot::InPort);
        let flows: Vec<_> = (0..8)
            .map(|i| {
                flow(
                    i,
                    FlowSpec::new(5)
                        .with_match(MatchPredicate::in_port(i as u32))
                        .with_match(MatchPredicate::vlan_vid(100)),
                )
            })
            .collect();
        for f in &flows {
            tree.add(f).unwrap();
        }
        assert_eq!(tree.len(), 8);
        tree.check_invariants().unwrap();

        for f in &flows {
            tree.remove(f).unwrap();
            tree.check_invariants().unwrap();
        }
        assert_eq!(tree.len(), 0);
        let Node::Index(root) = &tree.root else {
            panic!("root is an index");
        };
        let Children::Exact(map) = &root.children else {
            panic!("in_port is an exact level");
        };
        assert!(map.is_empty());

        assert_eq!(
            tree.remove(&flows[0]).unwrap_err(),
            ClassifierError::NotFound
        );
    }

    fn port_child(tree: &TreeClassifier, port: u128) -> &Node {
        let Node::Index(root) = &tree.root else {
            panic!("root is an index");
        };
        let Children::Exact(map) = &root.children else {
            panic!("in_port is an exact level");
        };
        &map[&port]
    }

    fn same_node(a: &Node, b: &Node) -> bool {
        match (a, b) {
            (Node::Index(a), Node::Index(b)) => Arc::ptr_eq(a, b),
            (Node::Leaf(a), Node::Leaf(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    #[test]
    fn copies_share_untouched_subtrees() {
        let on_port = |id: u64, port: u32| {
            flow(
                id,
                FlowSpec::new(5).with_match(MatchPredicate::in_port(port)),
            )
        };
        let mut tree = TreeClassifier::new(TreeRoot::InPort);
        tree.add(&on_port(1, 1)).unwrap();
        tree.add(&on_port(2, 2)).unwrap();

        let mut copy = tree.clone();
        copy.add(&on_port(3, 2)).unwrap();
        assert!(same_node(port_child(&tree, 1), port_child(&copy, 1)));
        assert!(!same_node(port_child(&tree, 2), port_child(&copy, 2)));
        assert!(!same_node(&tree.root, &copy.root));

        // The original is unchanged by writes to the copy.
        assert_eq!(tree.len(), 2);
        assert_eq!(copy.len(), 3);
        assert_eq!(port_child(&tree, 2).len(), 1);
        tree.check_invariants().unwrap();
        copy.check_invariants().unwrap();

        copy.remove(&on_port(1, 1)).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(port_child(&tree, 1).len(), 1);
        copy.check_invariants().unwrap();
    }

    #[test]
    fn metadata_root_and_find() {
        let mut tree = TreeClassifier::new(TreeRoot::Metadata);
        let spec = FlowSpec::new(9)
            .with_match(MatchPredicate::metadata_masked(0xab00, 0xff00))
            .with_match(MatchPredicate::eth_type(ETHER_TYPE_IPV4));
        let f = flow(1, spec.clone());
        tree.add(&f).unwrap();

        let probe = FlowEntry::probe(spec).unwrap();
        assert_eq!(tree.find(&probe).unwrap().id(), FlowId(1));
        assert_eq!(tree.flows().len(), 1);

        let frame = ipv4([1, 2, 3, 4]);
        let hit = PacketView::parse(&frame, 1).unwrap().with_metadata(0xabcd);
        let miss = PacketView::parse(&frame, 1).unwrap().with_metadata(0xaccd);
        assert_eq!(tree.lookup(&hit, None).unwrap().id(), FlowId(1));
        assert!(tree.lookup(&miss, None).is_none());
    }
}
