//! Request handlers called by the UI shell.

pub mod chat;
