//! GPU device implementations

pub mod gl;
pub mod headless;

pub use gl::GlDevice;
pub use headless::{DrawCommand, Fault, HeadlessDevice, HeadlessProgram, HeadlessTexture};
