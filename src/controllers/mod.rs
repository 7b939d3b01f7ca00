pub mod cluster;
pub mod cluster_controller;
pub mod exec;
pub mod members;
pub mod resources;
pub mod scale_down;
pub mod service;
pub mod statefulset;
pub mod store;
