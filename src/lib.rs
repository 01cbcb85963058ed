pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod oidc;
pub mod router;
pub mod views;

pub use error::AppError;
pub use router::{AppState, build_app};
