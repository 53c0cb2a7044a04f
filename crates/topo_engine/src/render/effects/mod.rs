//! Concrete effects used by the sensor pipeline and the topography scene

pub mod depth_geometry;
pub mod stream_converter;

pub use depth_geometry::{DepthGeometryEffect, GeometryPass};
pub use stream_converter::StreamConverter;
