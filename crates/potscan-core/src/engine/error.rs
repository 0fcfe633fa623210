use super::config::ConfigError;
use crate::core::io::pdb::PdbError;
use crate::core::io::xyz::XyzError;
use crate::core::models::system::SystemError;
use crate::core::potentials::PotentialError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to read topology {path:?}: {source}")]
    Topology {
        path: PathBuf,
        #[source]
        source: PdbError,
    },

    #[error("Failed to read trajectory {path:?}: {source}")]
    Trajectory {
        path: PathBuf,
        #[source]
        source: XyzError,
    },

    #[error("Trajectory does not match the topology: {0}")]
    Mismatch(#[source] XyzError),

    #[error(transparent)]
    System(#[from] SystemError),

    #[error("Failed to set up potential '{name}': {source}")]
    PotentialSetup {
        name: String,
        #[source]
        source: PotentialError,
    },

    #[error("Potential '{name}' failed: {source}")]
    Potential {
        name: String,
        #[source]
        source: PotentialError,
    },

    #[error("Frame {index}: {source}")]
    Frame {
        index: usize,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Failed to write energies to {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
