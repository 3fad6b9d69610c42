pub mod array;
pub mod array_key;
pub mod value;
