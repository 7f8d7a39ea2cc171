pub mod constants;
pub mod security;
