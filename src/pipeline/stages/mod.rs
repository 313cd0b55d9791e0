//! Pipeline stage implementations.

mod compile;
mod host;
mod shadow;
mod transpile;
mod verify;

pub use compile::CompileStage;
pub use host::{HostStage, HOST_STAGE};
pub use shadow::ShadowStage;
pub use transpile::TranspileStage;
pub use verify::VerifyStage;
