//! Observable collections.
//!
//! [`ObservableMap`] raises a [`MapChange`] for every mutation, over a
//! caller-chosen storage strategy from [`storage`].

pub mod observable_map;
pub mod storage;

pub use observable_map::{MapChange, ObservableMap, ObserverId};
pub use storage::{MapBacking, MapStorage, Synchronized, Unsynchronized};
