pub mod db;
pub mod documents;
pub mod mailer;
pub mod memory;
pub mod spreadsheet;

pub use db::DbAdapter;
pub use documents::FsDocumentStore;
pub use mailer::{LogMailer, SmtpMailer};
pub use memory::InMemoryDb;
