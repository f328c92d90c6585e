#![allow(dead_code)]

pub mod fixtures;
pub mod tabfold_env;
