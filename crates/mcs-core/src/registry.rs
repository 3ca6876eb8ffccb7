//! Node registry and in-process transport (spec §9 "device-proxy
//! cycles... resolved via a registry keyed by FQDN", §1 externalizes
//! the distributed-object middleware itself).
//!
//! Production deployments resolve a peer FQDN to a proxy object over
//! whatever middleware sits underneath the control system; that layer
//! is explicitly out of scope here (spec §1). [`Transport`] is the seam
//! it would plug into. [`LocalTransport`] is the one implementation
//! this crate ships: every node lives in the same process, so a lookup
//! is just a clone out of a `DashMap`.

use crate::controller::ControllerNode;
use crate::fqdn::Fqdn;
use crate::fsp::FspNode;
use crate::hardware::{LruNode, SlimLinkNode};
use crate::memo::MemoStore;
use crate::subarray::SubarrayNode;
use crate::vcc::VccNode;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Seam for a distributed middleware integration. The in-process
/// [`Registry`] is a `LocalTransport`; a production build would
/// implement this trait against whatever RPC layer the deployment
/// uses, without the node logic in `controller`/`subarray`/`vcc`/`fsp`
/// changing at all.
pub trait Transport: Send + Sync {
    fn resolve_subarray(&self, fqdn: &Fqdn) -> Option<Arc<SubarrayNode>>;
    fn resolve_vcc(&self, fqdn: &Fqdn) -> Option<Arc<VccNode>>;
    fn resolve_fsp(&self, fqdn: &Fqdn) -> Option<Arc<FspNode>>;
    fn resolve_lru(&self, fqdn: &Fqdn) -> Option<Arc<LruNode>>;
}

/// FQDN-keyed registry of every node in the tree, and the in-process
/// [`Transport`] implementation.
pub struct Registry {
    controller: RwLock<Option<Arc<ControllerNode>>>,
    subarrays: DashMap<Fqdn, Arc<SubarrayNode>>,
    vccs: DashMap<Fqdn, Arc<VccNode>>,
    fsps: DashMap<Fqdn, Arc<FspNode>>,
    lrus: DashMap<Fqdn, Arc<LruNode>>,
    slim_links: DashMap<Fqdn, Arc<SlimLinkNode>>,
    pub memo: Arc<MemoStore>,
}

impl Registry {
    pub fn new(memo: Arc<MemoStore>) -> Arc<Self> {
        Arc::new(Self {
            controller: RwLock::new(None),
            subarrays: DashMap::new(),
            vccs: DashMap::new(),
            fsps: DashMap::new(),
            lrus: DashMap::new(),
            slim_links: DashMap::new(),
            memo,
        })
    }

    pub fn register_controller(&self, node: Arc<ControllerNode>) {
        *self.controller.write() = Some(node);
    }

    pub fn controller(&self) -> Option<Arc<ControllerNode>> {
        self.controller.read().clone()
    }

    pub fn register_subarray(&self, node: Arc<SubarrayNode>) {
        self.subarrays.insert(node.fqdn.clone(), node);
    }

    pub fn register_vcc(&self, node: Arc<VccNode>) {
        self.vccs.insert(node.fqdn.clone(), node);
    }

    pub fn register_fsp(&self, node: Arc<FspNode>) {
        self.fsps.insert(node.fqdn.clone(), node);
    }

    pub fn register_lru(&self, node: Arc<LruNode>) {
        self.lrus.insert(node.fqdn.clone(), node);
    }

    pub fn register_slim_link(&self, node: Arc<SlimLinkNode>) {
        self.slim_links.insert(node.fqdn.clone(), node);
    }

    pub fn subarray(&self, fqdn: &Fqdn) -> Option<Arc<SubarrayNode>> {
        self.subarrays.get(fqdn).map(|r| r.clone())
    }

    pub fn vcc(&self, fqdn: &Fqdn) -> Option<Arc<VccNode>> {
        self.vccs.get(fqdn).map(|r| r.clone())
    }

    pub fn fsp(&self, fqdn: &Fqdn) -> Option<Arc<FspNode>> {
        self.fsps.get(fqdn).map(|r| r.clone())
    }

    pub fn lru(&self, fqdn: &Fqdn) -> Option<Arc<LruNode>> {
        self.lrus.get(fqdn).map(|r| r.clone())
    }

    pub fn slim_link(&self, fqdn: &Fqdn) -> Option<Arc<SlimLinkNode>> {
        self.slim_links.get(fqdn).map(|r| r.clone())
    }

    pub fn subarrays(&self) -> Vec<Arc<SubarrayNode>> {
        self.subarrays.iter().map(|e| e.value().clone()).collect()
    }

    pub fn vccs(&self) -> Vec<Arc<VccNode>> {
        self.vccs.iter().map(|e| e.value().clone()).collect()
    }

    pub fn fsps(&self) -> Vec<Arc<FspNode>> {
        self.fsps.iter().map(|e| e.value().clone()).collect()
    }

    pub fn lrus(&self) -> Vec<Arc<LruNode>> {
        self.lrus.iter().map(|e| e.value().clone()).collect()
    }

    pub fn slim_links(&self) -> Vec<Arc<SlimLinkNode>> {
        self.slim_links.iter().map(|e| e.value().clone()).collect()
    }
}

impl Transport for Registry {
    fn resolve_subarray(&self, fqdn: &Fqdn) -> Option<Arc<SubarrayNode>> {
        self.subarray(fqdn)
    }

    fn resolve_vcc(&self, fqdn: &Fqdn) -> Option<Arc<VccNode>> {
        self.vcc(fqdn)
    }

    fn resolve_fsp(&self, fqdn: &Fqdn) -> Option<Arc<FspNode>> {
        self.fsp(fqdn)
    }

    fn resolve_lru(&self, fqdn: &Fqdn) -> Option<Arc<LruNode>> {
        self.lru(fqdn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcc::{DishType, VccNode};

    #[test]
    fn register_then_resolve_round_trips() {
        let registry = Registry::new(Arc::new(MemoStore::in_memory()));
        let fqdn = Fqdn::from("mid_csp_cbf/vcc/001");
        registry.register_vcc(VccNode::new(fqdn.clone(), 1, DishType::Ska));
        assert!(registry.vcc(&fqdn).is_some());
        assert!(registry.vcc(&Fqdn::from("mid_csp_cbf/vcc/999")).is_none());
    }
}
