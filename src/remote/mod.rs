// Everything that talks to the vendor: the wizard pages on the site being installed and the
// client area (login, release downloads).

#[cfg(test)]
pub(crate) mod canned;
pub mod extractor;
pub mod login;
pub mod releases;
pub mod session;

pub use session::{Browser, HttpSession, HttpSettings};
