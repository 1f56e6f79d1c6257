//! Integration tests for planning, resumable execution and the remote channel

mod executor_flow;
mod resume;
mod scripted_driver;
