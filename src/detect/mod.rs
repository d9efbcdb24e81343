mod backend;
pub mod backends;
mod registry;
mod result;

pub use backend::{DetectionCapability, DetectorBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use backends::{StubBackend, StubResponse};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection};
