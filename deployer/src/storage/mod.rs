pub mod environments;
pub mod history;
pub mod layout;
pub mod settings;
