pub mod chunk_reader;
pub mod file_writer;
pub mod hashing;
