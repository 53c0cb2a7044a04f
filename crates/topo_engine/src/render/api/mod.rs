//! GPU device abstraction
//!
//! Renderers only ever see [`GpuDevice`]; the concrete backends live in
//! `render::backends`.

mod gpu_device;

pub use gpu_device::*;
