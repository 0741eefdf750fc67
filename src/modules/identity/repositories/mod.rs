pub mod in_memory;
pub mod user_directory;

pub use in_memory::InMemoryUserDirectory;
pub use user_directory::{MySqlUserDirectory, UserDirectory};
