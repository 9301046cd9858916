//! Shader templates and declarative patches
//!
//! A [`ShaderPatch`] never names literal shader text. It names semantic
//! [`InjectionPoint`]s, and each [`ShaderTemplate`] carries its own table
//! resolving those points to locations in its source. Changing a template
//! only means updating its anchor table.
//!
//! Templates expose `diffuseColor` (vec4) after albedo resolution and
//! `totalEmissiveRadiance` (vec3) after emissive accumulation; patches may
//! read and write both.

use std::collections::HashMap;

/// Semantic location a patch can inject code at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InjectionPoint {
    /// Vertex stage declarations
    VertexPreamble,
    /// Vertex stage, after the world position is known
    AfterWorldPosition,
    /// Fragment stage declarations
    FragmentPreamble,
    /// Fragment stage, after the base albedo is resolved
    AfterAlbedo,
    /// Fragment stage, after emissive radiance is accumulated
    AfterEmissive,
}

/// Pipeline stage a source belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
}

impl InjectionPoint {
    /// Stage the point lives in
    pub fn stage(self) -> ShaderStage {
        match self {
            InjectionPoint::VertexPreamble | InjectionPoint::AfterWorldPosition => ShaderStage::Vertex,
            InjectionPoint::FragmentPreamble
            | InjectionPoint::AfterAlbedo
            | InjectionPoint::AfterEmissive => ShaderStage::Fragment,
        }
    }
}

/// Shader resolution errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShaderError {
    /// The template has no anchor for a point a patch needs
    #[error("shader template '{template}' has no anchor for {point:?} (needed by patch '{patch}')")]
    MissingAnchor {
        /// Template being patched
        template: String,
        /// Patch that needed the point
        patch: String,
        /// Unresolved point
        point: InjectionPoint,
    },

    /// The anchor's marker text is absent from the template source
    #[error("shader template '{template}' anchor for {point:?} not found in source: {marker:?}")]
    AnchorNotFound {
        /// Template being patched
        template: String,
        /// Point whose marker is missing
        point: InjectionPoint,
        /// Marker that was searched for
        marker: String,
    },
}

/// Code to insert at one injection point
#[derive(Debug, Clone, PartialEq)]
pub struct Injection {
    /// Where the code goes
    pub point: InjectionPoint,
    /// GLSL to insert
    pub code: String,
}

/// Named set of injections applied together
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderPatch {
    /// Identifies the patch in program cache keys
    pub name: String,
    /// Injections in application order
    pub injections: Vec<Injection>,
}

impl ShaderPatch {
    /// Start an empty patch
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            injections: Vec::new(),
        }
    }

    /// Add an injection
    pub fn inject(mut self, point: InjectionPoint, code: impl Into<String>) -> Self {
        self.injections.push(Injection { point, code: code.into() });
        self
    }

    /// Per-instance colour and emission read from instance attributes
    ///
    /// Multiplies the albedo by `instanceColor` and adds
    /// `instanceEmissive.rgb * instanceEmissive.a` to the emissive radiance.
    pub fn instance_appearance() -> Self {
        Self::new("instance_appearance")
            .inject(
                InjectionPoint::VertexPreamble,
                "layout(location = 8) in vec3 instanceColor;\n\
                 layout(location = 9) in vec4 instanceEmissive;\n\
                 layout(location = 6) out vec3 vInstanceColor;\n\
                 layout(location = 7) out vec4 vInstanceEmissive;",
            )
            .inject(
                InjectionPoint::AfterWorldPosition,
                "vInstanceColor = instanceColor;\n\
                 vInstanceEmissive = instanceEmissive;",
            )
            .inject(
                InjectionPoint::FragmentPreamble,
                "layout(location = 6) in vec3 vInstanceColor;\n\
                 layout(location = 7) in vec4 vInstanceEmissive;",
            )
            .inject(InjectionPoint::AfterAlbedo, "diffuseColor.rgb *= vInstanceColor;")
            .inject(
                InjectionPoint::AfterEmissive,
                "totalEmissiveRadiance += vInstanceEmissive.rgb * vInstanceEmissive.a;",
            )
    }
}

/// Vertex and fragment source pair
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSource {
    /// Vertex shader
    pub vertex: String,
    /// Fragment shader
    pub fragment: String,
}

/// Resolved program for one material variant
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderProgram {
    /// Template the program came from
    pub template: String,
    /// Names of the patches applied, in order
    pub patches: Vec<String>,
    /// Final source
    pub source: ShaderSource,
}

/// Base shader source plus its injection anchor table
#[derive(Debug, Clone)]
pub struct ShaderTemplate {
    name: String,
    source: ShaderSource,
    /// Each point resolves to "insert after this marker"
    anchors: HashMap<InjectionPoint, String>,
}

const STANDARD_VERTEX: &str = "#version 450
layout(location = 0) in vec3 position;
layout(location = 1) in vec3 normal;
layout(location = 2) in mat4 instanceMatrix;
layout(set = 0, binding = 0) uniform Camera { mat4 view; mat4 projection; } camera;
layout(location = 0) out vec3 vWorldPosition;
layout(location = 1) out vec3 vNormal;
void main() {
    vec4 worldPosition = instanceMatrix * vec4(position, 1.0);
    vWorldPosition = worldPosition.xyz;
    vNormal = mat3(instanceMatrix) * normal;
    gl_Position = camera.projection * camera.view * worldPosition;
}
";

const STANDARD_FRAGMENT: &str = "#version 450
layout(location = 0) in vec3 vWorldPosition;
layout(location = 1) in vec3 vNormal;
layout(set = 1, binding = 0) uniform Material { vec4 baseColor; vec4 emissive; vec4 surface; } material;
layout(location = 0) out vec4 outColor;
void main() {
    vec4 diffuseColor = material.baseColor;
    vec3 totalEmissiveRadiance = material.emissive.rgb * material.emissive.a;
    float metalness = material.surface.x;
    float roughness = material.surface.y;
    vec3 n = normalize(vNormal);
    float diffuse = max(dot(n, normalize(vec3(0.4, 1.0, 0.6))), 0.0);
    float ambient = mix(0.25, 0.1, metalness);
    vec3 lit = diffuseColor.rgb * (diffuse * (1.0 - 0.5 * roughness) + ambient);
    outColor = vec4(lit + totalEmissiveRadiance, diffuseColor.a);
}
";

const UNLIT_FRAGMENT: &str = "#version 450
layout(location = 0) in vec3 vWorldPosition;
layout(location = 1) in vec3 vNormal;
layout(set = 1, binding = 0) uniform Material { vec4 baseColor; } material;
layout(location = 0) out vec4 outColor;
void main() {
    vec4 diffuseColor = material.baseColor;
    outColor = diffuseColor;
}
";

impl ShaderTemplate {
    /// Template from raw sources with an empty anchor table
    pub fn new(name: impl Into<String>, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: ShaderSource {
                vertex: vertex.into(),
                fragment: fragment.into(),
            },
            anchors: HashMap::new(),
        }
    }

    /// Resolve `point` to the location just after `marker`
    pub fn with_anchor(mut self, point: InjectionPoint, marker: impl Into<String>) -> Self {
        self.anchors.insert(point, marker.into());
        self
    }

    /// Default lit template
    pub fn standard() -> Self {
        Self::new("standard", STANDARD_VERTEX, STANDARD_FRAGMENT)
            .with_anchor(InjectionPoint::VertexPreamble, "#version 450")
            .with_anchor(InjectionPoint::AfterWorldPosition, "vWorldPosition = worldPosition.xyz;")
            .with_anchor(InjectionPoint::FragmentPreamble, "#version 450")
            .with_anchor(InjectionPoint::AfterAlbedo, "vec4 diffuseColor = material.baseColor;")
            .with_anchor(
                InjectionPoint::AfterEmissive,
                "vec3 totalEmissiveRadiance = material.emissive.rgb * material.emissive.a;",
            )
    }

    /// Flat-colour template; it has no emissive stage
    pub fn unlit() -> Self {
        Self::new("unlit", STANDARD_VERTEX, UNLIT_FRAGMENT)
            .with_anchor(InjectionPoint::VertexPreamble, "#version 450")
            .with_anchor(InjectionPoint::AfterWorldPosition, "vWorldPosition = worldPosition.xyz;")
            .with_anchor(InjectionPoint::FragmentPreamble, "#version 450")
            .with_anchor(InjectionPoint::AfterAlbedo, "vec4 diffuseColor = material.baseColor;")
    }

    /// Template name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unpatched source
    pub fn source(&self) -> &ShaderSource {
        &self.source
    }

    /// Apply `patches` in order and return the final source
    ///
    /// Every injection is resolved before any text is produced, so a
    /// missing anchor never yields a half-patched program.
    pub fn apply(&self, patches: &[ShaderPatch]) -> Result<ShaderSource, ShaderError> {
        for patch in patches {
            for injection in &patch.injections {
                let marker = self.anchors.get(&injection.point).ok_or_else(|| ShaderError::MissingAnchor {
                    template: self.name.clone(),
                    patch: patch.name.clone(),
                    point: injection.point,
                })?;
                let source = match injection.point.stage() {
                    ShaderStage::Vertex => &self.source.vertex,
                    ShaderStage::Fragment => &self.source.fragment,
                };
                if !source.contains(marker.as_str()) {
                    return Err(ShaderError::AnchorNotFound {
                        template: self.name.clone(),
                        point: injection.point,
                        marker: marker.clone(),
                    });
                }
            }
        }

        let mut output = self.source.clone();
        for patch in patches {
            for injection in &patch.injections {
                let marker = &self.anchors[&injection.point];
                let target = match injection.point.stage() {
                    ShaderStage::Vertex => &mut output.vertex,
                    ShaderStage::Fragment => &mut output.fragment,
                };
                // Markers are checked against the pristine source; injected
                // code never removes them, so they are still present here
                if let Some(at) = target.find(marker.as_str()) {
                    let insert_at = at + marker.len();
                    target.insert_str(insert_at, &format!("\n{}", injection.code));
                }
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub() -> ShaderTemplate {
        ShaderTemplate::new("stub", "V0\n@world\nV1", "F0\n@albedo\n@emissive\nF1")
            .with_anchor(InjectionPoint::VertexPreamble, "V0")
            .with_anchor(InjectionPoint::AfterWorldPosition, "@world")
            .with_anchor(InjectionPoint::FragmentPreamble, "F0")
            .with_anchor(InjectionPoint::AfterAlbedo, "@albedo")
            .with_anchor(InjectionPoint::AfterEmissive, "@emissive")
    }

    #[test]
    fn test_appearance_patch_on_stub_template() {
        let source = stub().apply(&[ShaderPatch::instance_appearance()]).unwrap();

        let albedo = source.fragment.find("@albedo").unwrap();
        let multiply = source.fragment.find("diffuseColor.rgb *= vInstanceColor;").unwrap();
        let emissive = source.fragment.find("@emissive").unwrap();
        let add = source
            .fragment
            .find("totalEmissiveRadiance += vInstanceEmissive.rgb * vInstanceEmissive.a;")
            .unwrap();
        assert!(albedo < multiply && multiply < emissive && emissive < add);

        let world = source.vertex.find("@world").unwrap();
        assert!(source.vertex.find("vInstanceColor = instanceColor;").unwrap() > world);
        assert!(source.vertex.find("in vec3 instanceColor;").unwrap() < world);
    }

    #[test]
    fn test_missing_anchor_is_reported() {
        let template = ShaderTemplate::new("bare", "V", "F").with_anchor(InjectionPoint::VertexPreamble, "V");
        let err = template.apply(&[ShaderPatch::instance_appearance()]).unwrap_err();
        assert!(matches!(
            err,
            ShaderError::MissingAnchor { point: InjectionPoint::AfterWorldPosition, .. }
        ));
    }

    #[test]
    fn test_marker_absent_from_source() {
        let template = stub().with_anchor(InjectionPoint::AfterAlbedo, "@nowhere");
        let err = template.apply(&[ShaderPatch::instance_appearance()]).unwrap_err();
        assert!(matches!(err, ShaderError::AnchorNotFound { point: InjectionPoint::AfterAlbedo, .. }));
    }

    #[test]
    fn test_standard_template_resolves_and_unlit_lacks_emissive() {
        let patched = ShaderTemplate::standard()
            .apply(&[ShaderPatch::instance_appearance()])
            .unwrap();
        assert!(patched.fragment.starts_with("#version 450\n"));
        assert!(patched.fragment.contains("diffuseColor.rgb *= vInstanceColor;"));

        assert!(ShaderTemplate::unlit().apply(&[]).is_ok());
        assert!(ShaderTemplate::unlit().apply(&[ShaderPatch::instance_appearance()]).is_err());
    }

    #[test]
    fn test_patches_apply_in_order() {
        let first = ShaderPatch::new("first").inject(InjectionPoint::AfterAlbedo, "// first");
        let second = ShaderPatch::new("second").inject(InjectionPoint::AfterAlbedo, "// second");
        let source = stub().apply(&[first, second]).unwrap();
        // Later injections at the same point land closer to the marker
        assert!(source.fragment.find("// second").unwrap() < source.fragment.find("// first").unwrap());
    }
}
