//! Chrome-backed implementation of [`crate::WebPage`].

mod chrome;

pub use chrome::{find_chrome, ChromePage};
