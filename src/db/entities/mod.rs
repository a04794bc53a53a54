//! Database entities

pub mod file_chunk;
pub mod stored_file;
pub mod whole_file;

pub use file_chunk::Entity as FileChunk;
pub use stored_file::Entity as StoredFile;
pub use whole_file::Entity as WholeFile;
