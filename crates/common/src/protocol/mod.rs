// Wire types for the progress HTTP API.

pub mod progress;
