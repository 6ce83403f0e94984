pub mod gaia;
pub mod hipparcos;
