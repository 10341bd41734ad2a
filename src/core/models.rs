pub mod common;
pub mod option;
pub mod response;
pub mod tally;
pub mod user;
pub mod vote;
