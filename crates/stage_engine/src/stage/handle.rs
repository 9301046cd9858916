//! Opaque handles returned by stage insertion

use crate::render::{BatchSignature, ItemKey, MaterialProxy, MeshKey};
use crate::spatial::SpatialKey;

#[derive(Debug)]
pub(crate) enum HandleTarget {
    Single(MeshKey),
    Batched { signature: BatchSignature, item: ItemKey },
}

/// The only way to move, restyle or remove an inserted object
///
/// Handles are not `Clone`: [`Stage::destroy_instance`] consumes the
/// handle, so a destroyed instance cannot be touched again. A handle is
/// only meaningful to the stage that issued it.
///
/// [`Stage::destroy_instance`]: super::Stage::destroy_instance
#[derive(Debug)]
pub struct InstanceHandle {
    pub(crate) target: HandleTarget,
    pub(crate) spatial: SpatialKey,
    pub(crate) material: MaterialProxy,
    pub(crate) appearance: bool,
}

impl InstanceHandle {
    /// Restricted surface over the rendered material
    pub fn material(&self) -> &MaterialProxy {
        &self.material
    }

    /// Whether per-instance colour and emission can be set
    pub fn supports_appearance(&self) -> bool {
        self.appearance
    }

    /// Whether the instance shares an instanced draw
    pub fn is_batched(&self) -> bool {
        matches!(self.target, HandleTarget::Batched { .. })
    }

    /// Signature of the batch holding the instance
    pub fn batch_signature(&self) -> Option<&BatchSignature> {
        match &self.target {
            HandleTarget::Batched { signature, .. } => Some(signature),
            HandleTarget::Single(_) => None,
        }
    }

    /// Key of the instance's spatial index entry
    pub fn spatial_key(&self) -> SpatialKey {
        self.spatial
    }
}
