pub mod service;
pub mod state;
