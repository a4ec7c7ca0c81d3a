pub mod error;
pub mod fingerprint;
pub mod group;
pub mod ports;
pub mod report;
pub mod row;
pub mod taxonomy;
pub mod value_objects;
