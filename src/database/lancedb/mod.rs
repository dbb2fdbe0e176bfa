// LanceDB vector database module
// Embedded storage and similarity search for chunk embeddings

pub mod vector_store;

pub use vector_store::VectorStore;
