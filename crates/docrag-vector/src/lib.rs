pub mod index;
pub mod mmr;
pub mod retriever;
pub mod schema;
pub mod table;
