pub mod fetch;
pub mod pdf;
pub mod sentences;
