pub mod store;
pub mod tokener;
