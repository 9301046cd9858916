//! Primitive node state and validation
//!
//! Setters validate their input before touching any state and report what
//! the change means for the mounted instance through [`PrimChange`]; the
//! scene decides whether that is a rebuild, a transform update or an
//! immediate per-instance write.

use crate::foundation::math::Vec3;
use crate::physics::BodyKind;
use crate::render::{Color, Emissive, PrimitiveKind};

use super::NodeError;

const NODE: &str = "prim";

/// Effect of a prim property write
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimChange {
    /// Value was already set
    Unchanged,
    /// Batch signature changed; remount on the next flush
    Rebuild,
    /// Render scale changed
    Transform,
    /// Per-instance colour changed
    Color(Color),
    /// Per-instance emission changed
    Emissive(Emissive),
}

/// Physics body attached to a prim
#[derive(Debug, Clone, PartialEq)]
pub struct PrimPhysics {
    /// Body type
    pub body: BodyKind,
    /// Mass for dynamic bodies
    pub mass: f32,
    /// Overlap-only body
    pub trigger: bool,
    /// Tag reported to contacts
    pub tag: Option<String>,
}

impl Default for PrimPhysics {
    fn default() -> Self {
        Self {
            body: BodyKind::Static,
            mass: 1.0,
            trigger: false,
            tag: None,
        }
    }
}

/// A unit primitive scaled to `size`, drawn with per-instance appearance
#[derive(Debug, Clone, PartialEq)]
pub struct PrimNode {
    kind: PrimitiveKind,
    size: [f32; 3],
    color: Color,
    emissive: Option<Emissive>,
    cast_shadow: bool,
    receive_shadow: bool,
    physics: Option<PrimPhysics>,
}

impl Default for PrimNode {
    fn default() -> Self {
        Self {
            kind: PrimitiveKind::Box,
            size: [1.0, 1.0, 1.0],
            color: Color::WHITE,
            emissive: None,
            cast_shadow: true,
            receive_shadow: true,
            physics: None,
        }
    }
}

fn invalid(property: &'static str, reason: impl Into<String>) -> NodeError {
    NodeError::Invalid {
        node: NODE,
        property,
        reason: reason.into(),
    }
}

/// Zero and NaN count as unset
fn or_unset(value: Option<f32>, fallback: f32) -> f32 {
    match value {
        Some(v) if v != 0.0 && !v.is_nan() => v,
        _ => fallback,
    }
}

/// Normalize a 1-3 entry size, filling missing entries from the first
pub fn normalize_size(value: &[f32]) -> Result<[f32; 3], NodeError> {
    if value.is_empty() || value.len() > 3 {
        return Err(invalid("size", "must be array of 1-3 numbers"));
    }
    if value.iter().any(|v| v.is_infinite()) {
        return Err(invalid("size", "entries must be finite"));
    }
    let first = or_unset(value.first().copied(), 1.0);
    Ok([
        first,
        or_unset(value.get(1).copied(), first),
        or_unset(value.get(2).copied(), first),
    ])
}

/// Parse an emissive colour and intensity
pub fn parse_emissive(color: &str, intensity: f32) -> Result<Emissive, NodeError> {
    let color = Color::parse(color).map_err(|err| invalid("emissive", err.to_string()))?;
    if !intensity.is_finite() || intensity < 0.0 {
        return Err(invalid("emissive", format!("intensity must be a finite non-negative number, got {intensity}")));
    }
    Ok(Emissive::with_intensity(color, intensity))
}

impl PrimNode {
    /// Prim of the given kind with default properties
    pub fn new(kind: PrimitiveKind) -> Self {
        Self { kind, ..Self::default() }
    }

    /// Builder: size
    pub fn with_size(mut self, size: &[f32]) -> Result<Self, NodeError> {
        self.size = normalize_size(size)?;
        Ok(self)
    }

    /// Builder: colour
    pub fn with_color(mut self, color: &str) -> Result<Self, NodeError> {
        self.set_color(color)?;
        Ok(self)
    }

    /// Builder: emission
    pub fn with_emissive(mut self, color: &str, intensity: f32) -> Result<Self, NodeError> {
        self.emissive = Some(parse_emissive(color, intensity)?);
        Ok(self)
    }

    /// Builder: physics body
    pub fn with_physics(mut self, physics: PrimPhysics) -> Self {
        self.physics = Some(physics);
        self
    }

    /// Primitive kind
    pub fn kind(&self) -> PrimitiveKind {
        self.kind
    }

    /// Normalized size
    pub fn size(&self) -> [f32; 3] {
        self.size
    }

    /// Instance colour
    pub fn color(&self) -> Color {
        self.color
    }

    /// Instance emission
    pub fn emissive(&self) -> Option<Emissive> {
        self.emissive
    }

    /// Casts shadows
    pub fn cast_shadow(&self) -> bool {
        self.cast_shadow
    }

    /// Receives shadows
    pub fn receive_shadow(&self) -> bool {
        self.receive_shadow
    }

    /// Physics body, if any
    pub fn physics(&self) -> Option<&PrimPhysics> {
        self.physics.as_ref()
    }

    /// Scale applied on top of the node transform
    pub fn render_scale(&self) -> Vec3 {
        self.kind.scale_for_size(self.size)
    }

    /// Set the kind from its name
    pub fn set_kind(&mut self, value: &str) -> Result<PrimChange, NodeError> {
        let kind: PrimitiveKind = value.parse().map_err(|_| invalid("kind", format!("invalid: {value}")))?;
        if kind == self.kind {
            return Ok(PrimChange::Unchanged);
        }
        self.kind = kind;
        Ok(PrimChange::Rebuild)
    }

    /// Set the size from 1-3 entries
    pub fn set_size(&mut self, value: &[f32]) -> Result<PrimChange, NodeError> {
        let size = normalize_size(value)?;
        if size == self.size {
            return Ok(PrimChange::Unchanged);
        }
        self.size = size;
        Ok(PrimChange::Transform)
    }

    /// Set the colour from any supported colour string
    pub fn set_color(&mut self, value: &str) -> Result<PrimChange, NodeError> {
        let color = Color::parse(value).map_err(|err| invalid("color", err.to_string()))?;
        if color == self.color {
            return Ok(PrimChange::Unchanged);
        }
        self.color = color;
        Ok(PrimChange::Color(color))
    }

    /// Set or clear the emission; clearing writes zero emission
    pub fn set_emissive(&mut self, value: Option<(&str, f32)>) -> Result<PrimChange, NodeError> {
        let emissive = value
            .map(|(color, intensity)| parse_emissive(color, intensity))
            .transpose()?;
        if emissive == self.emissive {
            return Ok(PrimChange::Unchanged);
        }
        self.emissive = emissive;
        Ok(PrimChange::Emissive(emissive.unwrap_or(Emissive::NONE)))
    }

    /// Toggle shadow casting
    pub fn set_cast_shadow(&mut self, value: bool) -> PrimChange {
        if value == self.cast_shadow {
            return PrimChange::Unchanged;
        }
        self.cast_shadow = value;
        PrimChange::Rebuild
    }

    /// Toggle shadow receiving
    pub fn set_receive_shadow(&mut self, value: bool) -> PrimChange {
        if value == self.receive_shadow {
            return PrimChange::Unchanged;
        }
        self.receive_shadow = value;
        PrimChange::Rebuild
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let prim = PrimNode::default();
        assert_eq!(prim.kind(), PrimitiveKind::Box);
        assert_eq!(prim.size(), [1.0, 1.0, 1.0]);
        assert_eq!(prim.color(), Color::WHITE);
        assert!(prim.emissive().is_none());
        assert!(prim.cast_shadow() && prim.receive_shadow());
    }

    #[test]
    fn test_size_normalization() {
        assert_eq!(normalize_size(&[2.0]).unwrap(), [2.0, 2.0, 2.0]);
        assert_eq!(normalize_size(&[2.0, 3.0]).unwrap(), [2.0, 3.0, 2.0]);
        assert_eq!(normalize_size(&[0.0, 0.0, 4.0]).unwrap(), [1.0, 1.0, 4.0]);
        assert_eq!(normalize_size(&[3.0, 0.0, 0.0]).unwrap(), [3.0, 3.0, 3.0]);
        assert!(normalize_size(&[]).is_err());
        assert!(normalize_size(&[1.0, 1.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn test_invalid_values_leave_state_untouched() {
        let mut prim = PrimNode::default();
        let err = prim.set_kind("pyramid").unwrap_err();
        assert!(err.to_string().starts_with("[prim] kind"));
        assert!(prim.set_color("not-a-color").is_err());
        assert!(prim.set_emissive(Some(("#ff0000", f32::NAN))).is_err());
        assert_eq!(prim, PrimNode::default());
    }

    #[test]
    fn test_change_classification() {
        let mut prim = PrimNode::default();
        assert_eq!(prim.set_kind("box").unwrap(), PrimChange::Unchanged);
        assert_eq!(prim.set_kind("sphere").unwrap(), PrimChange::Rebuild);
        assert_eq!(prim.set_size(&[2.0]).unwrap(), PrimChange::Transform);
        assert_eq!(
            prim.set_color("#ff0000").unwrap(),
            PrimChange::Color(Color::new(1.0, 0.0, 0.0))
        );
        assert_eq!(prim.set_cast_shadow(false), PrimChange::Rebuild);
        assert_eq!(prim.set_cast_shadow(false), PrimChange::Unchanged);
        assert!(matches!(prim.set_emissive(Some(("#00ff00", 2.0))).unwrap(), PrimChange::Emissive(_)));
        assert_eq!(prim.set_emissive(None).unwrap(), PrimChange::Emissive(Emissive::NONE));
    }
}
