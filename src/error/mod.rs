use thiserror::Error;

use crate::model::ModelError;
use crate::nlmixr::ConversionError;

#[derive(Error, Debug)]
pub enum PharmtransError {
    #[error("Error in the model snapshot: {0}")]
    ModelError(#[from] ModelError),
    #[error("Error converting the model: {0}")]
    ConversionError(#[from] ConversionError),
}
