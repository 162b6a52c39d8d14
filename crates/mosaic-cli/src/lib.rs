//! Mosaic CLI support code

pub mod output;
