pub mod matrix;
pub mod parser;

pub use matrix::{CompatMatrix, OutcomeClass};
pub use parser::{Directive, Expectation, PhptError, PhptTest};
