pub mod auth;
pub mod authors;
pub mod books;
pub mod health;
pub mod index;
pub mod payload;
