pub mod chat;
pub mod init;
pub mod models;
pub mod status;
