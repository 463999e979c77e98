pub mod error;
pub mod inputs;
pub mod report;
pub mod verify;

pub use error::CheckError;
pub use inputs::CheckInputs;
pub use report::{CheckReport, NameMismatch, ValueDrift, VerifiedKey, CHECK_NAME};
pub use verify::{run_check, verify_configuration};
