#![forbid(unsafe_code)]

pub mod cache;
pub mod forge;
pub mod git;
pub mod models;
pub mod naming;
pub mod notes;
pub mod persistence;
pub mod registry;
pub mod scan;
pub mod scripts;
pub mod status_tree;
pub mod tasks;
pub mod trust;
