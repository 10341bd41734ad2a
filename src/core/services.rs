pub mod eligibility;
pub mod response;
pub mod tally;
pub mod vote;
