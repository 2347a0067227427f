//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod documents;
pub mod health;
pub mod query;
pub mod sessions;
pub mod ui;
