use crate::core::building::parameters::DerivationError;
use crate::core::dac::DacMappingError;
use crate::input::SettingsError;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum LbtError {
    #[error("Operator settings were rejected: {0}")]
    InvalidSettings(#[from] SettingsError),
    #[error("Building model could not be derived: {0}")]
    Derivation(#[from] DerivationError),
    #[error("Rig configuration is invalid: {0}")]
    InvalidConfig(#[from] DacMappingError),
}
