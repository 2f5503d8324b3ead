pub mod cascade;
pub mod search;
