pub mod command;
pub(crate) mod utils;
