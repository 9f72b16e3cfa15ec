pub mod compound;
pub mod config;
pub mod field_catalog;
pub mod filter;
pub mod group;
pub mod index_store;
pub mod indexer;
pub mod mapping;
pub mod matcher;
pub mod paths;
pub mod state;
pub mod util;
