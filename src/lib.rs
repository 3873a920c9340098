// Library exports for isocollapse
pub mod abundance;
pub mod chain;
pub mod chain_config;
pub mod collapse;
pub mod counting;
pub mod error;
pub mod exon_chain;
pub mod fuzzy;
pub mod gff;
pub mod group;
pub mod io_utils;
pub mod locus;
pub mod mega_info;
pub mod mega_tree;
pub mod representative;
pub mod runner;
pub mod sam;
pub mod sequences;
pub mod union_find;

pub use error::{Error, Result};
