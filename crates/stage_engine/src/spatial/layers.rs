//! Render layer masks
//!
//! Every render item sits on one or more of 32 layers. Raycasts carry a
//! mask and only see items that share at least one layer with it.

use bitflags::bitflags;

bitflags! {
    /// 32-bit layer membership / query mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Layers: u32 {
        /// Layer 0, where every node starts
        const DEFAULT = 1 << 0;
        /// Layer 1, conventionally environment geometry
        const ENVIRONMENT = 1 << 1;
        /// Layer 2, conventionally player avatars
        const PLAYER = 1 << 2;
        /// Layer 3, conventionally editor-only helpers
        const HELPER = 1 << 3;
    }
}

impl Layers {
    /// Every one of the 32 layers, the mask used when a query names none
    pub const ALL: Layers = Layers::from_bits_retain(u32::MAX);

    /// Mask containing only `layer` (0..32)
    pub fn layer(layer: u32) -> Self {
        Self::from_bits_retain(1u32.checked_shl(layer).unwrap_or(0))
    }

    /// True when the two masks share any layer
    pub fn test(self, other: Layers) -> bool {
        self.intersects(other)
    }
}

impl Default for Layers {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_masks() {
        assert!(Layers::ALL.test(Layers::DEFAULT));
        assert!(!Layers::PLAYER.test(Layers::DEFAULT));
        assert!(Layers::layer(31).test(Layers::ALL));
        assert!(!Layers::layer(31).test(Layers::all()));
        assert!(Layers::layer(40).is_empty());
    }
}
