//! Shader effects
//!
//! An effect file names a set of techniques, each a list of passes, plus
//! the parameters its shaders read. The [`EffectCache`] compiles each file
//! once and shares it between every [`Effect`] that asks for the same path.

mod cache;
mod descriptor;
mod instance;
mod parameters;

use std::path::PathBuf;

use thiserror::Error;

pub use cache::{EffectCache, EffectHandle, LoadedEffect, Pass, Technique};
pub use descriptor::{
    EffectDescriptor, ParameterDescriptor, ParameterKind, ParameterValue, PassDescriptor,
    ResolvedEffect, ResolvedPass, ResolvedTechnique, ShaderSource, TechniqueDescriptor,
};
pub use instance::Effect;
pub use parameters::ParameterBlock;

/// Effect loading errors
#[derive(Error, Debug)]
pub enum EffectError {
    /// The effect file does not exist
    #[error("Could not find effect file: {}", .0.display())]
    NotFound(PathBuf),

    /// Reading the effect file or one of its shader sources failed
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The effect file is not a valid effect description
    #[error("Failed to parse effect {}: {message}", .path.display())]
    Parse {
        /// Effect file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// A parameter declaration is inconsistent
    #[error("Invalid parameter `{name}` in effect {}: {message}", .path.display())]
    InvalidParameter {
        /// Effect file
        path: PathBuf,
        /// Parameter name
        name: String,
        /// What is wrong with it
        message: String,
    },

    /// No technique in the effect compiled on this device
    #[error("No valid techniques in effect {}", .0.display())]
    NoValidTechniques(PathBuf),

    /// A required technique is absent or failed validation
    #[error("Effect {} has no valid technique {name}", .path.display())]
    MissingTechnique {
        /// Effect file
        path: PathBuf,
        /// Technique name
        name: String,
    },

    /// The effect has been released or was never loaded
    #[error("Effect {} is not loaded", .0.display())]
    NotLoaded(PathBuf),
}
