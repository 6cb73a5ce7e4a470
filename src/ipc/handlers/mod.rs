pub mod core;
pub mod courses;
pub mod exchange;
pub mod grid;
pub mod session;
