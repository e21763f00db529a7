pub mod ps;
pub mod wmic;
