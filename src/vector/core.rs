//! Core data structures for metric-space search.
//!
//! This module contains the vector representation, the distance metrics and
//! the metric space that validates every point entering the system.

pub mod distance;
pub mod space;
pub mod vector;
