//! # UI Module
//!
//! Discord embeds for now-playing announcements, queue listings and errors.

pub mod embeds;
