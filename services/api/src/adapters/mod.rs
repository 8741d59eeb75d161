pub mod db;
pub mod google;
pub mod smtp;

pub use db::PgStore;
pub use google::GoogleTokenVerifier;
pub use smtp::{LogMailer, SmtpMailer};
