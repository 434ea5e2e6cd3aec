#![doc = include_str!("../README.md")]

pub mod logger;
pub mod platform;
pub mod tracking;

#[cfg(test)]
pub mod test_support;
