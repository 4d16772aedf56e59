//! Last Minute EPG
//!
//! Turns an XMLTV feed into a "what's on now" listing for media-center
//! front ends: parse, resolve now/next per channel, classify, build JSON.

pub mod classify;
pub mod config;
pub mod epg;
pub mod error;
pub mod fetch;
pub mod listing;
pub mod lookup;
pub mod pipeline;


pub use error::{EpgError, Result};
