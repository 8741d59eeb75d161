pub mod domain;
pub mod listing;
pub mod memory;
pub mod ports;

pub use domain::{Answer, Email, ProfileChanges, Question, User, VerifiedIdentity};
pub use listing::{AnswersFilter, AnswersLocation, AnswersSort, ListingConfig, QuestionsSort};
pub use ports::{ForumStore, Mailer, PortError, PortResult, TokenVerifier};
