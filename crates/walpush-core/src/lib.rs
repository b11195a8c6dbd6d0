pub mod bundle;
pub mod compress;
pub mod config;
pub mod crypto;
pub mod delta;
pub mod sentinel;
pub mod sink;
pub mod tarball;
pub mod upload;

pub use walpush_types::error;

#[cfg(test)]
mod testutil;

#[cfg(test)]
mod tests;
