//! Application layer: the single-owner keyboard engine, the playback worker,
//! and the macro service facade that ties them to recording storage.

pub mod keyboard_engine;
pub mod macro_service;
pub mod playback;
