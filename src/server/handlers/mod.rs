pub mod chat;
pub mod health;
pub mod news;
pub mod sessions;
