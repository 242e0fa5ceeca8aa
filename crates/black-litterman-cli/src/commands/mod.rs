pub mod allocate;
pub mod market;
