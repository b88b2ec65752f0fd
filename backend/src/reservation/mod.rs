pub mod cascade;
pub mod coordinator;
pub mod inventory;
