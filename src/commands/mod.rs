pub mod declarative;
pub mod import;
pub mod state;
