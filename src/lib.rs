pub mod app_state;
pub mod clock;
pub mod config;
pub mod error;
pub mod filestore;
pub mod instance;
pub mod prelude;
pub mod request;
pub mod retry;
pub mod scheduler;
pub mod server;
