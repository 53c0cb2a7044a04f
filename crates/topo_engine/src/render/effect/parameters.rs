//! CPU-side parameter storage for an effect

use super::descriptor::{ParameterDescriptor, ParameterKind, ParameterValue};
use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::api::{GpuDevice, ProgramId, TextureId, UniformValue};

#[derive(Debug, Clone)]
struct Slot {
    name: String,
    kind: ParameterKind,
    value: Option<UniformValue>,
}

/// Values for an effect's declared parameters
///
/// Setters are checked against the declared kind. Samplers get texture
/// units in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ParameterBlock {
    slots: Vec<Slot>,
}

impl From<ParameterValue> for UniformValue {
    fn from(value: ParameterValue) -> Self {
        match value {
            ParameterValue::Float(v) => Self::Float(v),
            ParameterValue::Vec3(v) => Self::Vec3(v),
            ParameterValue::Vec4(v) => Self::Vec4(v),
            ParameterValue::Mat4(v) => Self::Mat4(v),
        }
    }
}

impl ParameterBlock {
    /// Block seeded with each parameter's default
    pub fn from_descriptors(descriptors: &[ParameterDescriptor]) -> Self {
        let slots = descriptors
            .iter()
            .map(|d| Slot {
                name: d.name.clone(),
                kind: d.kind,
                value: d.default.map(UniformValue::from),
            })
            .collect();
        Self { slots }
    }

    fn set(&mut self, name: &str, kind: ParameterKind, value: UniformValue) -> bool {
        let Some(slot) = self.slots.iter_mut().find(|s| s.name == name) else {
            log::debug!("Effect has no parameter `{name}`");
            return false;
        };
        if slot.kind != kind {
            log::warn!("Parameter `{name}` is {:?}, not {kind:?}", slot.kind);
            return false;
        }
        slot.value = Some(value);
        true
    }

    /// Set a `float` parameter
    pub fn set_float(&mut self, name: &str, value: f32) -> bool {
        self.set(name, ParameterKind::Float, UniformValue::Float(value))
    }

    /// Set a `vec3` parameter
    pub fn set_vec3(&mut self, name: &str, value: &Vec3) -> bool {
        self.set(name, ParameterKind::Vec3, UniformValue::Vec3([value.x, value.y, value.z]))
    }

    /// Set a `vec4` parameter
    pub fn set_vec4(&mut self, name: &str, value: &Vec4) -> bool {
        self.set(name, ParameterKind::Vec4, UniformValue::Vec4([value.x, value.y, value.z, value.w]))
    }

    /// Set a `mat4` parameter
    pub fn set_mat4(&mut self, name: &str, value: &Mat4) -> bool {
        self.set(name, ParameterKind::Mat4, UniformValue::from(value))
    }

    /// Bind a texture to a sampler parameter
    pub fn set_texture(&mut self, name: &str, texture: TextureId) -> bool {
        let unit = self
            .slots
            .iter()
            .filter(|s| s.kind == ParameterKind::Sampler)
            .position(|s| s.name == name)
            .unwrap_or(0);
        #[allow(clippy::cast_possible_truncation)]
        let unit = unit as u32;
        self.set(name, ParameterKind::Sampler, UniformValue::Sampler { unit, texture })
    }

    /// Copy values from `other` for parameters both blocks declare with the same kind
    pub fn inherit(&mut self, other: &Self) {
        for slot in &mut self.slots {
            if let Some(previous) = other.slots.iter().find(|s| s.name == slot.name && s.kind == slot.kind) {
                if previous.value.is_some() {
                    slot.value = previous.value;
                }
            }
        }
    }

    /// Current value of a parameter
    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.slots.iter().find(|s| s.name == name).and_then(|s| s.value)
    }

    /// Upload every parameter that has a value to `program`
    pub fn upload(&self, gpu: &mut dyn GpuDevice, program: ProgramId) {
        for slot in &self.slots {
            if let Some(value) = slot.value {
                if !gpu.set_uniform(program, &slot.name, value) {
                    log::trace!("Program {program:?} does not use `{}`", slot.name);
                }
            }
        }
    }
}
