pub mod builtins;
pub mod core;
pub mod phpt;
pub mod runtime;
pub mod vm;
