#![allow(clippy::cast_precision_loss)]

mod failures;
mod jobs;
mod loop_control;
mod resume;
mod support;
