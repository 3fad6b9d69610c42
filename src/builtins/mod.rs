pub mod array;
pub mod exception;
pub mod json;
pub mod pcre;
pub mod serialize;
pub mod variable;
