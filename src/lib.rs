//! Translation of pharmacometric model snapshots into nlmixr R scripts
//!
//! The crate takes an immutable [`model::Model`] snapshot (parsed upstream,
//! or loaded from JSON), classifies its residual-error model symbolically and
//! emits the equivalent nlmixr `ini({...})`/`model({...})` script.
//!
//! # Example
//!
//! ```no_run
//! use pharmtrans::model::Model;
//! use pharmtrans::nlmixr::{convert_model, ErrorPolicy};
//!
//! # fn main() -> Result<(), pharmtrans::PharmtransError> {
//! let json = std::fs::read_to_string("model.json").unwrap();
//! let model = Model::from_json(&json)?;
//! let script = convert_model(&model, ErrorPolicy::Abort)?;
//! println!("{script}");
//! # Ok(())
//! # }
//! ```

pub mod codegen;
pub mod error;
pub mod expr;
pub mod model;
pub mod nlmixr;

pub use error::PharmtransError;

pub mod prelude {
    pub mod model {
        pub use crate::model::{
            Epsilon, Eta, Model, ModelError, OdeEquation, OdeSystem, Parameter, Parameters,
            RandomVariables, Statement, Statements,
        };
    }
    pub mod nlmixr {
        pub use crate::nlmixr::{convert_model, ConversionError, ErrorPolicy};
    }

    pub use crate::codegen::CodeGenerator;
    pub use crate::expr::{Branch, Cond, Expr};
    pub use crate::PharmtransError;
}
