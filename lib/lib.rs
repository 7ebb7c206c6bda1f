#![allow(dead_code, non_snake_case, non_upper_case_globals)]

pub mod error;
pub mod config;
pub mod basis;
pub mod evolve;
pub mod interaction;
pub mod model;
pub mod register;
