//! Effect file format
//!
//! Effect files are RON documents:
//!
//! ```ron
//! EffectDescriptor(
//!     name: "kinect_depth_to_texture",
//!     parameters: [
//!         (name: "KinectDepthSampler", kind: Sampler),
//!     ],
//!     techniques: [
//!         (
//!             name: "KinectDepthConverter",
//!             passes: [
//!                 (
//!                     vertex: File("fullscreen.vert"),
//!                     fragment: Inline("#version 330 core ..."),
//!                     state: (depth_test: false, depth_write: false),
//!                 ),
//!             ],
//!         ),
//!     ],
//! )
//! ```
//!
//! Shader files are resolved relative to the effect file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::EffectError;
use crate::render::api::RenderState;

/// Top-level effect document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectDescriptor {
    /// Display name
    pub name: String,
    /// Parameters shared by all techniques
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
    /// Alternative ways to render with this effect
    pub techniques: Vec<TechniqueDescriptor>,
}

/// Parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// `float`
    Float,
    /// `vec3`
    Vec3,
    /// `vec4`
    Vec4,
    /// `mat4`
    Mat4,
    /// `sampler2D`
    Sampler,
}

/// Literal parameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    /// `float`
    Float(f32),
    /// `vec3`
    Vec3([f32; 3]),
    /// `vec4`
    Vec4([f32; 4]),
    /// `mat4`, column-major
    Mat4([f32; 16]),
}

impl ParameterValue {
    /// Kind this value satisfies
    pub const fn kind(&self) -> ParameterKind {
        match self {
            Self::Float(_) => ParameterKind::Float,
            Self::Vec3(_) => ParameterKind::Vec3,
            Self::Vec4(_) => ParameterKind::Vec4,
            Self::Mat4(_) => ParameterKind::Mat4,
        }
    }
}

/// Named effect parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Uniform name in the shaders
    pub name: String,
    /// Type
    pub kind: ParameterKind,
    /// Value uploaded until the owner sets one
    #[serde(default)]
    pub default: Option<ParameterValue>,
}

/// Named technique
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechniqueDescriptor {
    /// Technique name used by `Effect::set_technique`
    pub name: String,
    /// Passes in draw order
    pub passes: Vec<PassDescriptor>,
}

/// Where a shader stage's GLSL comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShaderSource {
    /// Source text in the effect file
    Inline(String),
    /// Path relative to the effect file
    File(PathBuf),
}

/// One draw of the geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassDescriptor {
    /// Vertex stage
    pub vertex: ShaderSource,
    /// Fragment stage
    pub fragment: ShaderSource,
    /// Fixed-function state for the pass
    #[serde(default)]
    pub state: RenderState,
}

/// Effect with every shader source read from disk
#[derive(Debug, Clone)]
pub struct ResolvedEffect {
    /// Display name
    pub name: String,
    /// Parameters
    pub parameters: Vec<ParameterDescriptor>,
    /// Techniques
    pub techniques: Vec<ResolvedTechnique>,
}

/// Technique with resolved sources
#[derive(Debug, Clone)]
pub struct ResolvedTechnique {
    /// Technique name
    pub name: String,
    /// Passes
    pub passes: Vec<ResolvedPass>,
}

/// Pass with resolved sources
#[derive(Debug, Clone)]
pub struct ResolvedPass {
    /// Vertex GLSL
    pub vertex: String,
    /// Fragment GLSL
    pub fragment: String,
    /// Fixed-function state
    pub state: RenderState,
}

impl EffectDescriptor {
    /// Read and parse an effect file, then resolve its shader sources
    pub fn load(path: &Path) -> Result<ResolvedEffect, EffectError> {
        if !path.is_file() {
            return Err(EffectError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| EffectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let descriptor = Self::parse(&text, path)?;
        descriptor.resolve(path.parent().unwrap_or_else(|| Path::new("")), path)
    }

    /// Parse effect text; `origin` is only used in error messages
    pub fn parse(text: &str, origin: &Path) -> Result<Self, EffectError> {
        let descriptor: Self = ron::from_str(text).map_err(|e| EffectError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        descriptor.validate(origin)?;
        Ok(descriptor)
    }

    fn validate(&self, origin: &Path) -> Result<(), EffectError> {
        let mut seen = HashSet::new();
        for param in &self.parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(EffectError::InvalidParameter {
                    path: origin.to_path_buf(),
                    name: param.name.clone(),
                    message: "declared more than once".to_string(),
                });
            }
            if let Some(default) = &param.default {
                if default.kind() != param.kind {
                    return Err(EffectError::InvalidParameter {
                        path: origin.to_path_buf(),
                        name: param.name.clone(),
                        message: format!("default is {:?} but parameter is {:?}", default.kind(), param.kind),
                    });
                }
            }
        }
        if self.techniques.is_empty() {
            return Err(EffectError::Parse {
                path: origin.to_path_buf(),
                message: "effect declares no techniques".to_string(),
            });
        }
        Ok(())
    }

    /// Read file-backed shader sources relative to `base_dir`
    pub fn resolve(self, base_dir: &Path, origin: &Path) -> Result<ResolvedEffect, EffectError> {
        let read = |source: ShaderSource| -> Result<String, EffectError> {
            match source {
                ShaderSource::Inline(text) => Ok(text),
                ShaderSource::File(relative) => {
                    let path = base_dir.join(relative);
                    std::fs::read_to_string(&path).map_err(|source| EffectError::Io { path, source })
                }
            }
        };

        let mut techniques = Vec::with_capacity(self.techniques.len());
        for technique in self.techniques {
            let mut passes = Vec::with_capacity(technique.passes.len());
            for pass in technique.passes {
                passes.push(ResolvedPass {
                    vertex: read(pass.vertex)?,
                    fragment: read(pass.fragment)?,
                    state: pass.state,
                });
            }
            techniques.push(ResolvedTechnique { name: technique.name, passes });
        }

        log::trace!("Resolved effect {} from {}", self.name, origin.display());
        Ok(ResolvedEffect {
            name: self.name,
            parameters: self.parameters,
            techniques,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EFFECT: &str = r#"
EffectDescriptor(
    name: "test",
    parameters: [
        (name: "Source", kind: Sampler),
        (name: "Atten", kind: Vec3, default: Some(Vec3((0.0, 0.01, 0.0)))),
    ],
    techniques: [
        (
            name: "Main",
            passes: [
                (
                    vertex: File("quad.vert"),
                    fragment: Inline("void main() {}"),
                    state: (depth_test: false),
                ),
            ],
        ),
    ],
)
"#;

    #[test]
    fn test_load_resolves_relative_shader_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("quad.vert"), "void main() { gl_Position = vec4(0.0); }").unwrap();
        let effect_path = dir.path().join("test.ron");
        std::fs::File::create(&effect_path).unwrap().write_all(EFFECT.as_bytes()).unwrap();

        let effect = EffectDescriptor::load(&effect_path).unwrap();
        assert_eq!(effect.name, "test");
        assert_eq!(effect.parameters.len(), 2);
        assert_eq!(effect.parameters[1].default, Some(ParameterValue::Vec3([0.0, 0.01, 0.0])));

        let pass = &effect.techniques[0].passes[0];
        assert!(pass.vertex.contains("gl_Position"));
        assert_eq!(pass.fragment, "void main() {}");
        assert!(!pass.state.depth_test);
        assert!(pass.state.depth_write);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = EffectDescriptor::load(&dir.path().join("nope.ron")).unwrap_err();
        assert!(matches!(err, EffectError::NotFound(_)));
    }

    #[test]
    fn test_missing_shader_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let effect_path = dir.path().join("test.ron");
        std::fs::write(&effect_path, EFFECT).unwrap();
        let err = EffectDescriptor::load(&effect_path).unwrap_err();
        assert!(matches!(err, EffectError::Io { .. }));
    }

    #[test]
    fn test_mismatched_default_rejected() {
        let text = r#"EffectDescriptor(
            name: "bad",
            parameters: [(name: "X", kind: Float, default: Some(Vec3((1.0, 2.0, 3.0))))],
            techniques: [(name: "T", passes: [])],
        )"#;
        let err = EffectDescriptor::parse(text, Path::new("bad.ron")).unwrap_err();
        assert!(matches!(err, EffectError::InvalidParameter { .. }));
    }

    #[test]
    fn test_empty_technique_list_rejected() {
        let text = r#"EffectDescriptor(name: "empty", techniques: [])"#;
        assert!(matches!(
            EffectDescriptor::parse(text, Path::new("empty.ron")),
            Err(EffectError::Parse { .. })
        ));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(
            EffectDescriptor::parse("not an effect", Path::new("x.ron")),
            Err(EffectError::Parse { .. })
        ));
    }
}
