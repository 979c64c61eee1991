//! Helpers shared by stimulus datasets

pub mod frames;

pub use frames::{crop, pad, repeat_last, resample, FrameAxis, PadMode, PadSide};
