// Library root: the live draft engine and its persistence/collaborator seams.

pub mod draft;
pub mod error;
pub mod gateway;
pub mod services;

pub use draft::engine::{
    DraftEngine, EngineSettings, PickOutcome, PickRequest, SweepReport, TimeoutOutcome,
};
pub use error::{DraftError, GatewayError};
