pub mod auth;
pub mod chat;
pub mod cli;
pub mod config;
pub mod context;
pub mod debounce;
pub mod error;
pub mod forms;
pub mod geo;
pub mod http;
pub mod notifications;
pub mod profile;
pub mod realtime;
pub mod rides;
pub mod session;
pub mod state;
pub mod storage;
pub mod upload;
pub mod view;

pub use context::Context;
pub use error::{ClientError, ClientResult};
