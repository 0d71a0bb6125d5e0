pub mod extract;
pub mod fields;
