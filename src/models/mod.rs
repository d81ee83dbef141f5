pub mod credentials;
pub mod page;
pub mod site;
pub mod state;
pub mod version;
