pub mod command;
pub mod executor;
pub mod retry;
pub mod scripted;
pub mod shell;
