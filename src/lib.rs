pub mod blink_classifier;
pub mod config;
pub mod controller;
pub mod cooldown;
pub mod dispatcher;
pub mod facial_classifier;
pub mod frame_source;
pub mod gaze_classifier;
pub mod gesture_buffer;
pub mod head_classifier;
pub mod hid;
pub mod mapping;
pub mod pipeline;
pub mod status;
pub mod types;
