pub mod admission;
pub mod api;
pub mod cli;
pub mod clock;
pub mod error;
pub mod ledger;
pub mod limiters;
pub mod network;
pub mod processor;
pub mod service;
pub mod settings;
pub mod store;
pub mod wallet;
