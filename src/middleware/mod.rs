pub mod auth;
pub mod compression;
pub mod method_override;
