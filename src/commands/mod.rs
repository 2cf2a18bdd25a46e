pub mod chat;
pub mod evaluate;
pub mod index;
pub mod query;
pub mod search;
