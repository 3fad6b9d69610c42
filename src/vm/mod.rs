pub mod array_access;
pub mod comparison;
pub mod error;
pub mod inc_dec;
pub mod string_ops;
pub mod type_conversion;
pub mod variable_ops;
