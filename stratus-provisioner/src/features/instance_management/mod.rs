pub mod controller;
pub mod instance;
pub mod service;
