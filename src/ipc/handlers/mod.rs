pub mod auth;
pub mod core;
pub mod reference;
pub mod roster;
pub mod setup;
pub mod table;
