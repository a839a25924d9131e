pub mod peaks;
pub mod restore;
